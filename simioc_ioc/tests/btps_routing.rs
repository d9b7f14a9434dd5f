//! BTPS routing tests.
//!
//! Builds the full `btps` IOC into one store, runs every task's startup and
//! then ticks only the BTPS state task. Motor readbacks and camera frame
//! counters are posted directly so each scenario controls its inputs.

use simioc_common::consts::LASER_SOURCES;
use simioc_common::prelude::*;
use simioc_common::sim::{BtpsConfig, NominalSeed};
use simioc_ioc::devices::btps::{BtpsLinks, BtpsState, BtpsTask};
use simioc_ioc::iocs;
use std::thread;
use std::time::Duration;

const STATE: &str = "SIM:LTLHN:BTPS:";

struct Btps {
    store: MemoryStore,
    task: Box<dyn SimTask>,
}

impl Btps {
    fn start(btps: BtpsConfig) -> Self {
        let config = IocConfig {
            btps,
            ..Default::default()
        };
        let store = MemoryStore::new();
        let assembly = iocs::btps::build("SIM:", &config).unwrap();
        assembly.schema.register_into(&store).unwrap();

        let mut state_task = None;
        for mut task in assembly.tasks {
            task.startup(&store).unwrap();
            if task.name() == STATE {
                state_task = Some(task);
            }
        }
        Self {
            store,
            task: state_task.unwrap(),
        }
    }

    fn tick(&mut self) {
        self.task.tick(&self.store).unwrap();
    }

    /// Post a linear stage readback for `source`.
    fn linear(&self, source: u8, position: f64) {
        let motor = match source {
            1 => "m1",
            5 => "m4",
            8 => "m7",
            other => panic!("no laser source {other}"),
        };
        self.store
            .post(
                &format!("SIM:LAS:BTS:MCS2:01:{motor}.RBV"),
                PvValue::Double(position),
            )
            .unwrap();
    }

    /// Advance every camera's frame counter by one.
    fn new_frames(&self) {
        for bay in [1, 3, 4] {
            for cam in ["01", "02"] {
                let name = format!("SIM:LAS:LHN:BAY{bay}:CAM:{cam}:Stats2:ArrayCounter_RBV");
                let counter = self.store.read_i64(&name).unwrap();
                self.store.post(&name, PvValue::Int(counter + 1)).unwrap();
            }
        }
    }

    fn current_dest(&self, source: u8) -> i64 {
        self.store
            .read_i64(&format!("{STATE}Shutter:{source:02}:CurrentDest_RBV"))
            .unwrap()
    }

    fn flag(&self, suffix: &str) -> bool {
        self.store.read_bool(&format!("{STATE}{suffix}")).unwrap()
    }
}

fn seed(destination: u8, source: u8, linear: f64, tolerance: f64) -> NominalSeed {
    NominalSeed {
        destination,
        source,
        linear: Some(linear),
        rotary: None,
        goniometer: None,
        tolerance: Some(tolerance),
    }
}

fn seeded(seeds: Vec<NominalSeed>) -> BtpsConfig {
    BtpsConfig {
        nominal: seeds,
        ..Default::default()
    }
}

#[test]
fn unseeded_ranges_route_nowhere() {
    let mut btps = Btps::start(BtpsConfig::default());
    btps.tick();
    for source in LASER_SOURCES {
        assert_eq!(btps.current_dest(source), 0);
    }
    assert!(!btps.flag("DEST:01:SRC:01:InPosition_RBV"));
}

#[test]
fn linear_stage_selects_destination() {
    let mut btps = Btps::start(seeded(vec![seed(3, 1, 10.0, 0.5)]));
    btps.linear(1, 10.2);
    btps.tick();

    assert_eq!(btps.current_dest(1), 3);
    assert_eq!(btps.current_dest(5), 0);
    assert!(btps.flag("DEST:03:SRC:01:InPosition_RBV"));
    assert!(btps.flag("DEST:03:SRC:01:Linear:InRange_RBV"));
    assert!(!btps.flag("DEST:04:SRC:01:InPosition_RBV"));

    // Same inputs, same answer.
    for _ in 0..3 {
        btps.tick();
        assert_eq!(btps.current_dest(1), 3);
    }

    btps.linear(1, 20.0);
    btps.tick();
    assert_eq!(btps.current_dest(1), 0);
}

#[test]
fn overlapping_ranges_are_ambiguous() {
    // m7 starts at 405.
    let mut btps = Btps::start(seeded(vec![seed(3, 8, 405.0, 1.0), seed(7, 8, 405.5, 1.0)]));
    btps.tick();
    assert_eq!(btps.current_dest(8), -1);

    btps.linear(8, 406.2);
    btps.tick();
    assert_eq!(btps.current_dest(8), 7);
}

#[test]
fn range_bounds_are_exclusive_unless_inclusive() {
    let mut btps = Btps::start(seeded(vec![seed(2, 5, 1.0, 1.0)]));
    btps.linear(5, 2.0);
    btps.tick();
    assert_eq!(btps.current_dest(5), 0);

    btps.store
        .write(&format!("{STATE}DEST:02:SRC:05:Linear:Inclusive"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.current_dest(5), 2);
}

#[test]
fn client_range_writes_take_effect() {
    let mut btps = Btps::start(BtpsConfig::default());
    btps.linear(1, 55.0);
    let check = format!("{STATE}DEST:09:SRC:01:Linear:");
    btps.store
        .write(&format!("{check}Low"), PvValue::Double(50.0))
        .unwrap();
    btps.store
        .write(&format!("{check}High"), PvValue::Double(60.0))
        .unwrap();
    btps.tick();

    assert_eq!(btps.store.read_f64(&format!("{check}Value_RBV")).unwrap(), 55.0);
    assert_eq!(btps.current_dest(1), 9);
}

#[test]
fn load_config_restores_seeded_ranges() {
    let mut btps = Btps::start(seeded(vec![seed(3, 1, 30.0, 1.0)]));
    btps.linear(1, 30.0);
    btps.tick();
    assert_eq!(btps.current_dest(1), 3);

    // A client moves the range away from the stage.
    let check = format!("{STATE}DEST:03:SRC:01:Linear:");
    btps.store
        .write(&format!("{check}Low"), PvValue::Double(40.0))
        .unwrap();
    btps.store
        .write(&format!("{check}High"), PvValue::Double(41.0))
        .unwrap();
    btps.tick();
    assert_eq!(btps.current_dest(1), 0);

    btps.store
        .write(&format!("{STATE}Sim:LoadConfig"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.store.read_f64(&format!("{check}Low_RBV")).unwrap(), 29.0);
    assert_eq!(btps.current_dest(1), 3);

    // Without a new write the client's edits stick.
    btps.store
        .write(&format!("{check}Low"), PvValue::Double(40.0))
        .unwrap();
    btps.tick();
    assert_eq!(btps.current_dest(1), 0);
}

#[test]
fn camera_frames_drive_data_validity() {
    let mut btps = Btps::start(BtpsConfig::default());
    btps.tick();
    assert!(!btps.flag("DEST:01:SRC:01:Valid_RBV"));
    assert!(!btps.flag("Chk:NF1:IsUpdating_RBV"));

    btps.new_frames();
    btps.tick();
    assert!(btps.flag("Chk:NF1:IsUpdating_RBV"));
    assert!(btps.flag("Chk:FF8:IsUpdating_RBV"));
    assert!(btps.flag("DEST:01:SRC:01:Valid_RBV"));
    assert!(btps.flag("DEST:14:SRC:08:NFCenterX:Valid_RBV"));

    // Frames stop; once the limit passes the cameras go stale.
    btps.store
        .write(&format!("{STATE}Config:MaxFrameTime"), PvValue::Double(0.001))
        .unwrap();
    thread::sleep(Duration::from_millis(20));
    btps.tick();
    assert!(!btps.flag("Chk:NF1:IsUpdating_RBV"));
    assert!(!btps.flag("DEST:01:SRC:01:Valid_RBV"));
    assert!(
        btps.store
            .read_f64(&format!("{STATE}Chk:NF1:FrameTime_RBV"))
            .unwrap()
            > 0.001
    );
}

#[test]
fn valves_gate_entry_and_exit_readiness() {
    let mut btps = Btps::start(BtpsConfig::default());
    btps.tick();
    assert!(btps.flag("DEST:01:SRC:01:EntryValveReady_RBV"));
    assert!(btps.flag("DEST:06:ExitValveReady_RBV"));

    btps.store
        .write("SIM:LTLHN:LS1:VGC:01:OPN_SW", PvValue::Int(0))
        .unwrap();
    btps.store
        .write("SIM:LTLHN:LD6:VGC:01:OPN_SW", PvValue::Int(0))
        .unwrap();
    btps.tick();
    assert!(!btps.flag("DEST:01:SRC:01:EntryValveReady_RBV"));
    assert!(btps.flag("DEST:01:SRC:05:EntryValveReady_RBV"));
    assert!(!btps.flag("DEST:06:ExitValveReady_RBV"));
    assert!(!btps.flag("DEST:06:SRC:01:ChecksOK_RBV"));
}

#[test]
fn unseeded_valves_start_closed() {
    let mut btps = Btps::start(BtpsConfig {
        seed_valves: false,
        ..Default::default()
    });
    btps.tick();
    assert!(!btps.flag("DEST:01:SRC:01:EntryValveReady_RBV"));
    assert!(!btps.flag("DEST:01:ExitValveReady_RBV"));
}

#[test]
fn lss_moves_only_with_permission() {
    let mut btps = Btps::start(BtpsConfig::default());
    let lss = "SIM:LTLHN:LS1:LST:";
    btps.tick();

    btps.store
        .write(&format!("{lss}REQ"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.store.read_i64(&format!("{lss}REQ_RBV")).unwrap(), 1);
    assert_eq!(btps.store.read_i64(&format!("{lss}OPN_RBV")).unwrap(), 0);
    assert_eq!(btps.store.read_i64(&format!("{lss}CLS_RBV")).unwrap(), 0);

    // Granting permission does not replay the refused request.
    btps.store
        .write(&format!("{lss}LSS_RBV"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.store.read_i64(&format!("{lss}OPN_RBV")).unwrap(), 0);

    btps.store
        .write(&format!("{lss}REQ"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.store.read_i64(&format!("{lss}OPN_RBV")).unwrap(), 1);
    assert_eq!(btps.store.read_i64(&format!("{lss}CLS_RBV")).unwrap(), 0);

    // Other sources are untouched.
    assert_eq!(
        btps.store.read_i64("SIM:LTLHN:LS5:LST:OPN_RBV").unwrap(),
        0
    );
}

#[test]
fn sim_enable_freezes_outputs() {
    let mut btps = Btps::start(seeded(vec![seed(3, 1, 10.0, 0.5)]));
    btps.tick();
    assert_eq!(btps.current_dest(1), 0);

    btps.store
        .write(&format!("{STATE}SimEnable"), PvValue::Int(0))
        .unwrap();
    btps.linear(1, 10.0);
    btps.tick();
    assert_eq!(btps.current_dest(1), 0);

    btps.store
        .write(&format!("{STATE}SimEnable"), PvValue::Int(1))
        .unwrap();
    btps.tick();
    assert_eq!(btps.current_dest(1), 3);
}

#[test]
fn missing_links_halt_on_first_tick() {
    let store = MemoryStore::new();
    let state = BtpsState::new(STATE, NUM_DESTINATIONS, &LASER_SOURCES, &[]);
    state.schema().register_into(&store).unwrap();

    let mut task = BtpsTask::new(state, BtpsLinks::default(), &LASER_SOURCES, BtpsConfig::default());
    task.startup(&store).unwrap();
    let err = task.tick(&store).unwrap_err();
    assert!(matches!(err, SimError::Configuration(_)));
    assert!(err.is_fatal());
}

#[test]
fn unregistered_collaborators_halt_even_when_disabled() {
    let store = MemoryStore::new();
    let state = BtpsState::new(STATE, NUM_DESTINATIONS, &LASER_SOURCES, &[]);
    state.schema().register_into(&store).unwrap();

    // Links are wired but their PVs were never registered.
    let links = BtpsLinks::standard("SIM:", &LASER_SOURCES);
    let settings = BtpsConfig {
        sim_enable: false,
        ..Default::default()
    };
    let mut task = BtpsTask::new(state, links, &LASER_SOURCES, settings);
    task.startup(&store).unwrap();
    let err = task.tick(&store).unwrap_err();
    assert!(err.to_string().contains("not registered"));
}
