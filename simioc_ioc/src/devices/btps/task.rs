//! The periodic BTPS simulation pass.

use simioc_common::consts::{BTPS_PERIOD, DEFAULT_TOLERANCE};
use simioc_common::pv::{PvValue, ValueStore};
use simioc_common::sim::{BtpsConfig, SimError, SimTask};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::destination::{Centroid, SourceInputs};
use super::links::{BtpsLinks, BtpsMotorsAndCameras, BtsGateValves, SourceAxes};
use super::shutter::LssShutters;
use super::state::{BtpsState, CameraField, CameraStatus};
use crate::devices::camera::StatsPlugin;

/// Frame freshness of one camera, tracked across ticks.
#[derive(Debug, Clone)]
struct FrameTracker {
    last_counter: Option<i64>,
    last_change: Option<Instant>,
}

impl FrameTracker {
    fn new() -> Self {
        Self {
            last_counter: None,
            last_change: None,
        }
    }

    /// Record `counter` at `now`; returns `(frame_time, updating)`.
    fn observe(&mut self, counter: i64, now: Instant, max_frame_time: f64) -> (f64, bool) {
        if self.last_counter.is_some_and(|c| c != counter) {
            self.last_change = Some(now);
        }
        self.last_counter = Some(counter);

        match self.last_change {
            Some(at) => {
                let frame_time = now.duration_since(at).as_secs_f64();
                (frame_time, frame_time <= max_frame_time)
            }
            None => (0.0, false),
        }
    }
}

/// Sample every camera's frame counter and publish its status block.
/// Returns the freshness flags in camera order.
fn update_cameras(
    state: &BtpsState,
    frames: &mut [FrameTracker],
    period: Duration,
    store: &dyn ValueStore,
    motors: &BtpsMotorsAndCameras,
) -> Result<Vec<bool>, SimError> {
    let configured = state.config.max_frame_time(store)?;
    let max_frame_time = if configured > 0.0 {
        configured
    } else {
        2.0 * period.as_secs_f64()
    };

    let now = Instant::now();
    let mut updating = Vec::with_capacity(frames.len());
    for (camera, tracker) in state.cameras().iter().zip(frames.iter_mut()) {
        let plugin = plugin_for(motors, camera)?;
        let counter = store.read_i64(&plugin.array_counter())?;
        let (frame_time, fresh) = tracker.observe(counter, now, max_frame_time);
        camera.publish(store, frame_time, fresh)?;
        updating.push(fresh);
    }
    Ok(updating)
}

/// Runs the BTPS pass: valves, then destinations, then shutters.
pub struct BtpsTask {
    name: String,
    state: BtpsState,
    links: BtpsLinks,
    sources: Vec<u8>,
    settings: BtpsConfig,
    verified: bool,
    frames: Vec<FrameTracker>,
    load_config_seen: Option<u64>,
    period: Duration,
}

impl BtpsTask {
    /// Task for `state`, reading its collaborators through `links`.
    pub fn new(state: BtpsState, links: BtpsLinks, sources: &[u8], settings: BtpsConfig) -> Self {
        let frames = state.cameras().iter().map(|_| FrameTracker::new()).collect();
        Self {
            name: state.prefix().to_string(),
            state,
            links,
            sources: sources.to_vec(),
            settings,
            verified: false,
            frames,
            load_config_seen: None,
            period: BTPS_PERIOD,
        }
    }

    /// The state tree.
    pub fn state(&self) -> &BtpsState {
        &self.state
    }

    fn seed_nominals(&self, store: &dyn ValueStore) -> Result<(), SimError> {
        for seed in &self.settings.nominal {
            let src = self
                .state
                .destination(seed.destination)
                .and_then(|d| d.source(seed.source))
                .ok_or_else(|| {
                    SimError::Configuration(format!(
                        "No BTPS source {} at destination {}",
                        seed.source, seed.destination
                    ))
                })?;

            let tolerance = seed.tolerance.unwrap_or(DEFAULT_TOLERANCE);
            for (check, target) in src
                .stage_checks()
                .into_iter()
                .zip([seed.linear, seed.rotary, seed.goniometer])
            {
                if let Some(target) = target {
                    check.set_nominal(store, target, tolerance)?;
                }
            }
            debug!(
                "Seeded DEST:{:02} SRC:{:02} with tolerance {}",
                seed.destination, seed.source, tolerance
            );
        }
        Ok(())
    }

    /// Re-seed the nominal ranges when `Sim:LoadConfig` has been written
    /// since the last tick.
    fn reload_if_requested(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        let Some(seen) = self.load_config_seen else {
            return Ok(());
        };
        let generation = store.generation(&self.state.load_config_pv())?;
        if generation != seen {
            self.load_config_seen = Some(generation);
            info!("Reloading {} nominal ranges", self.settings.nominal.len());
            self.seed_nominals(store)?;
        }
        Ok(())
    }

    fn seed_names(&self, store: &dyn ValueStore) -> Result<(), SimError> {
        for dest in self.state.destinations() {
            store.post(&dest.name_pv(), PvValue::from(format!("Destination {}", dest.index())))?;
            for src in dest.sources() {
                store.post(&src.name_pv(), PvValue::from(format!("LS{}", src.source())))?;
            }
        }
        Ok(())
    }

    fn camera_valid(&self, updating: &[bool], source: u8, field: CameraField) -> bool {
        self.state
            .cameras()
            .iter()
            .zip(updating)
            .find(|(c, _)| c.source() == source && c.field() == field)
            .is_some_and(|(_, fresh)| *fresh)
    }

    fn source_inputs(
        &self,
        store: &dyn ValueStore,
        axes: &SourceAxes,
        updating: &[bool],
        entry_valve_ready: bool,
    ) -> Result<SourceInputs, SimError> {
        let centroid = |plugin: &StatsPlugin, field| -> Result<Centroid, SimError> {
            Ok(Centroid {
                x: store.read_f64(&plugin.centroid_x())?,
                y: store.read_f64(&plugin.centroid_y())?,
                valid: self.camera_valid(updating, axes.source, field),
            })
        };

        Ok(SourceInputs {
            linear: store.read_f64(&axes.linear.rbv())?,
            rotary: store.read_f64(&axes.rotary.rbv())?,
            goniometer: store.read_f64(&axes.goniometer.rbv())?,
            near_field: centroid(&axes.near_field, CameraField::Near)?,
            far_field: centroid(&axes.far_field, CameraField::Far)?,
            entry_valve_ready,
        })
    }

    /// Destinations pass. Returns the in-position flags per source, in
    /// destination order.
    fn simulate_destinations(
        &self,
        store: &dyn ValueStore,
        motors: &BtpsMotorsAndCameras,
        valves: &BtsGateValves,
        updating: &[bool],
    ) -> Result<Vec<(u8, Vec<bool>)>, SimError> {
        let mut inputs = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let axes = motors.source(*source).ok_or_else(|| unwired("motors", *source))?;
            let valve = valves.source(*source).ok_or_else(|| unwired("gate valve", *source))?;
            let ready = valve.is_ready(store)?;
            inputs.push((*source, self.source_inputs(store, axes, updating, ready)?));
        }

        let mut flags: Vec<(u8, Vec<bool>)> = self
            .sources
            .iter()
            .map(|s| (*s, Vec::with_capacity(self.state.destinations().len())))
            .collect();

        for dest in self.state.destinations() {
            let exit_ready = match valves.destination(dest.index()) {
                Some(valve) => valve.is_ready(store)?,
                None => false,
            };
            dest.set_exit_valve_ready(store, exit_ready)?;

            for ((source, input), (_, per_dest)) in inputs.iter().zip(flags.iter_mut()) {
                let in_position = match dest.source(*source) {
                    Some(src) => src.simulate(store, input)?.in_position,
                    None => false,
                };
                per_dest.push(in_position);
            }
        }
        Ok(flags)
    }

    fn simulate_shutters(
        &self,
        store: &dyn ValueStore,
        flags: &[(u8, Vec<bool>)],
    ) -> Result<(), SimError> {
        for (source, in_position) in flags {
            if let Some(shutter) = self.state.shutter(*source) {
                let before = store.read_i64(&shutter.current_destination())?;
                let dest = shutter.simulate(store, in_position)?;
                if dest < 0 && before >= 0 {
                    warn!("Laser source {} is in position for several destinations", source);
                }
            }
        }
        Ok(())
    }

    fn simulate_lss(lss: &mut LssShutters, store: &dyn ValueStore) -> Result<(), SimError> {
        for shutter in lss.iter_mut() {
            if shutter.simulate(store)? {
                debug!("LSS shutter {} moved", shutter.source());
            }
        }
        Ok(())
    }
}

fn plugin_for<'a>(motors: &'a BtpsMotorsAndCameras, camera: &CameraStatus) -> Result<&'a StatsPlugin, SimError> {
    let axes = motors
        .source(camera.source())
        .ok_or_else(|| unwired("cameras", camera.source()))?;
    Ok(match camera.field() {
        CameraField::Near => &axes.near_field,
        CameraField::Far => &axes.far_field,
    })
}

fn unwired(what: &str, source: u8) -> SimError {
    SimError::Configuration(format!("No {what} wired for laser source {source}"))
}

impl SimTask for BtpsTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn startup(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        store.post(&self.state.sim_enable_pv(), PvValue::from(self.settings.sim_enable))?;
        self.seed_names(store)?;
        self.seed_nominals(store)?;

        let load_config = self.state.load_config_pv();
        if store.contains(&load_config) {
            self.load_config_seen = Some(store.generation(&load_config)?);
        }

        if self.settings.seed_valves {
            if let Some(valves) = &self.links.valves {
                for valve in valves.iter() {
                    // Unregistered valves are reported by the first tick.
                    if store.contains(&valve.base.open_command()) {
                        valve.seed_open(store)?;
                    }
                }
            }
        }
        if let Some(lss) = &mut self.links.lss {
            for shutter in lss.iter_mut() {
                if store.contains(&shutter.request()) {
                    shutter.sync(store)?;
                }
            }
        }

        info!(
            "BTPS state {} ready: {} destinations, sources {:?}",
            self.state.prefix(),
            self.state.destinations().len(),
            self.sources
        );
        Ok(())
    }

    fn tick(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        if !self.verified {
            self.links.verify(store, &self.sources)?;
            self.verified = true;
        }
        self.reload_if_requested(store)?;

        if !self.state.sim_enabled(store)? {
            return Ok(());
        }

        let (Some(motors), Some(valves)) = (&self.links.motors, &self.links.valves) else {
            return Err(SimError::Configuration("BTPS links missing".to_string()));
        };

        for valve in valves.iter() {
            valve.simulate(store)?;
        }
        let updating = update_cameras(&self.state, &mut self.frames, self.period, store, motors)?;
        let flags = self.simulate_destinations(store, motors, valves, &updating)?;
        self.simulate_shutters(store, &flags)?;
        if let Some(lss) = &mut self.links.lss {
            Self::simulate_lss(lss, store)?;
        }
        Ok(())
    }
}
