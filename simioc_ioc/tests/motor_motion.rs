//! Motor IOC motion tests.
//!
//! Drives the `motor` IOC assembly tick by tick through a shared store, the
//! way the scheduler does, and checks what a client would see.

use simioc_common::prelude::*;
use simioc_ioc::iocs;

struct MotorIoc {
    store: MemoryStore,
    tasks: Vec<Box<dyn SimTask>>,
}

impl MotorIoc {
    fn start(config: &IocConfig) -> Self {
        let store = MemoryStore::new();
        let assembly = iocs::motor::build("sim:", config).unwrap();
        assembly.schema.register_into(&store).unwrap();

        let mut tasks = assembly.tasks;
        for task in &mut tasks {
            task.startup(&store).unwrap();
        }
        Self { store, tasks }
    }

    fn tick(&mut self, motor: &str) {
        let task = self
            .tasks
            .iter_mut()
            .find(|t| t.name() == motor)
            .unwrap();
        task.tick(&self.store).unwrap();
    }

    fn rbv(&self, motor: &str) -> f64 {
        self.store.read_f64(&format!("{motor}.RBV")).unwrap()
    }

    fn moving(&self, motor: &str) -> bool {
        self.store.read_bool(&format!("{motor}.MOVN")).unwrap()
    }
}

#[test]
fn fifty_units_at_one_hundred_per_second() {
    let mut ioc = MotorIoc::start(&IocConfig::default());
    ioc.store.write("sim:mtr1.VELO", PvValue::Double(100.0)).unwrap();
    ioc.store.write("sim:mtr1", PvValue::Double(50.0)).unwrap();

    for expected in [10.0, 20.0, 30.0, 40.0, 50.0] {
        ioc.tick("sim:mtr1");
        assert!((ioc.rbv("sim:mtr1") - expected).abs() < 1e-9);
        assert!(ioc.moving("sim:mtr1"));
        assert_eq!(ioc.store.read_i64("sim:mtr1.DMOV").unwrap(), 0);
    }

    ioc.tick("sim:mtr1");
    assert_eq!(ioc.rbv("sim:mtr1"), 50.0);
    assert!(!ioc.moving("sim:mtr1"));
    assert_eq!(ioc.store.read_i64("sim:mtr1.DMOV").unwrap(), 1);

    // Settled: further ticks change nothing.
    let generation = ioc.store.generation("sim:mtr1.RBV").unwrap();
    ioc.tick("sim:mtr1");
    assert_eq!(ioc.store.generation("sim:mtr1.RBV").unwrap(), generation);
}

#[test]
fn motors_are_independent() {
    let mut ioc = MotorIoc::start(&IocConfig::default());
    ioc.store.write("sim:mtr1", PvValue::Double(1.0)).unwrap();
    ioc.tick("sim:mtr1");
    ioc.tick("sim:mtr2");

    assert!(ioc.rbv("sim:mtr1") > 0.0);
    assert_eq!(ioc.rbv("sim:mtr2"), 0.0);
    assert!(!ioc.moving("sim:mtr2"));
}

#[test]
fn stop_mid_move_settles_in_place() {
    let mut ioc = MotorIoc::start(&IocConfig::default());
    ioc.store.write("sim:mtr3", PvValue::Double(10.0)).unwrap();
    ioc.tick("sim:mtr3");
    ioc.tick("sim:mtr3");
    let stopped_at = ioc.rbv("sim:mtr3");
    assert!(stopped_at > 0.0 && stopped_at < 10.0);

    ioc.store.write("sim:mtr3.STOP", PvValue::Int(1)).unwrap();
    ioc.tick("sim:mtr3");
    assert!(!ioc.moving("sim:mtr3"));
    assert_eq!(ioc.store.read_f64("sim:mtr3").unwrap(), stopped_at);

    for _ in 0..5 {
        ioc.tick("sim:mtr3");
    }
    assert_eq!(ioc.rbv("sim:mtr3"), stopped_at);
}

#[test]
fn xps_spmg_stop_discards_the_move() {
    let mut ioc = MotorIoc::start(&IocConfig::default());
    ioc.store.write("sim:xps:mtr1", PvValue::Double(3.0)).unwrap();
    ioc.tick("sim:xps:mtr1");
    assert!(ioc.moving("sim:xps:mtr1"));

    ioc.store
        .write("sim:xps:mtr1.SPMG", PvValue::from("Stop"))
        .unwrap();
    ioc.tick("sim:xps:mtr1");
    let held = ioc.rbv("sim:xps:mtr1");
    assert!(!ioc.moving("sim:xps:mtr1"));

    // Going again does not resume the discarded move.
    ioc.store
        .write("sim:xps:mtr1.SPMG", PvValue::from("Go"))
        .unwrap();
    ioc.tick("sim:xps:mtr1");
    assert_eq!(ioc.rbv("sim:xps:mtr1"), held);
}

#[test]
fn configured_start_position() {
    let mut config = IocConfig::default();
    config.motors.insert(
        "mtr2".to_string(),
        MotorConfig {
            position: Some(7.5),
            ..Default::default()
        },
    );
    let ioc = MotorIoc::start(&config);
    assert_eq!(ioc.rbv("sim:mtr2"), 7.5);
    assert_eq!(ioc.store.read_f64("sim:mtr2").unwrap(), 7.5);
}
