use sensorbus::sensor::{SensorDriver, Switch};
use sensorbus::sim::SimulatedBus;
use sensorbus::{Edge, Error, GpioController, GpioLevel, GpioPull, PinMode, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();
    let bus = SimulatedBus::new();
    let gpio = Arc::new(GpioController::new(bus.clone()));

    // A button on pin 3, counted through callbacks.
    let mut button = Switch::new(Arc::clone(&gpio), 3)?;

    // A data-ready line on pin 4, polled.
    gpio.setup_pin(4, PinMode::Input, GpioPull::Down, GpioLevel::Low)?;
    gpio.enable_edge_detection(4, Edge::Rising, None)?;

    let outside = bus.clone();
    let stimulus = thread::spawn(move || -> Result<()> {
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(50));
            outside.pulse(3)?;
        }
        outside.set_input_level(4, GpioLevel::High)?;
        Ok(())
    });

    println!("Waiting for data-ready on pin 4...");
    gpio.wait_for_edge(4, Edge::Rising, Some(Duration::from_secs(2)))?;
    println!("Data ready. Edge flag now: {}", gpio.has_edge_occurred(4)?);

    match stimulus.join() {
        Ok(result) => result?,
        Err(_) => return Err(Error::UnsupportedFeature("stimulus thread panicked".into())),
    }

    for (name, value) in button.data() {
        println!("{:<28} {}", name, value);
    }

    println!("Waiting again; this one runs out...");
    match gpio.wait_for_edge(4, Edge::Rising, Some(Duration::from_millis(100))) {
        Err(Error::EdgeWaitTimeout { timeout, .. }) => println!("No edge within {:?}", timeout),
        other => other?,
    }
    Ok(())
}
