//! Source shutters: BTPS shutter safety state and the LSS shutter interface.

use simioc_common::pv::{PvMetadata, PvSchema, PvValue, RBV_SUFFIX, ValueStore};
use simioc_common::sim::SimError;

const FALSE_TRUE: [&str; 2] = ["FALSE", "TRUE"];

/// Destination currently selected by a set of in-position flags.
///
/// `flags[i]` is the in-position flag of destination `i + 1`. Returns `0`
/// when no destination is in position, the 1-based index when exactly one
/// is, and `-1` when several are.
pub fn current_destination(flags: &[bool]) -> i64 {
    let mut hits = flags
        .iter()
        .enumerate()
        .filter(|(_, in_position)| **in_position)
        .map(|(idx, _)| idx as i64 + 1);

    match (hits.next(), hits.next()) {
        (None, _) => 0,
        (Some(dest), None) => dest,
        (Some(_), Some(_)) => -1,
    }
}

/// BTPS per-source shutter safety PVs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutterSafety {
    source: u8,
    prefix: String,
}

impl ShutterSafety {
    /// Shutter of `source` under the BTPS state prefix.
    pub fn new(state_prefix: &str, source: u8) -> Self {
        Self {
            source,
            prefix: format!("{state_prefix}Shutter:{source:02}:"),
        }
    }

    /// Laser source number.
    pub fn source(&self) -> u8 {
        self.source
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `UserOpen` setpoint.
    pub fn open_request(&self) -> String {
        self.pv("UserOpen")
    }

    /// `LSS:OpenRequest_RBV`.
    pub fn lss_open_request(&self) -> String {
        self.pv("LSS:OpenRequest_RBV")
    }

    /// `CurrentDest_RBV`.
    pub fn current_destination(&self) -> String {
        self.pv("CurrentDest_RBV")
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        schema
            .pair(
                self.open_request(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["Close", "Open"])
                    .doc("User request to open/close shutter"),
            )
            .add(
                self.pv("Error_RBV"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["No error", "Error"])
                    .read_only()
                    .doc("Latched error"),
            )
            .pair(
                self.pv("Acknowledge"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&FALSE_TRUE)
                    .doc("User acknowledgement of latched fault"),
            )
            .pair(
                self.pv("Override"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["Normal mode", "Override mode"])
                    .doc("BTPS advanced override mode"),
            )
            .add(
                self.lss_open_request(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["Request close", "Request open"])
                    .read_only()
                    .doc("Output request to LSS open shutter"),
            )
            .add(
                self.pv("Safe_RBV"),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&["Unsafe", "Safe"])
                    .read_only()
                    .doc("BTPS safe to open indicator"),
            )
            .add(
                self.current_destination(),
                0,
                PvMetadata::new()
                    .read_only()
                    .doc("Destination in position for this source (0 none, -1 several)"),
            );
        schema
    }

    /// Mirror the open request and publish the current destination.
    pub fn simulate(&self, store: &dyn ValueStore, in_position: &[bool]) -> Result<i64, SimError> {
        let request = store.read_bool(&format!("{}{RBV_SUFFIX}", self.open_request()))?;
        store.update_if_differs(&self.lss_open_request(), PvValue::from(request))?;

        let dest = current_destination(in_position);
        store.update_if_differs(&self.current_destination(), PvValue::Int(dest))?;
        Ok(dest)
    }
}

/// Laser shutter system interface for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LssShutter {
    source: u8,
    prefix: String,
    seen_generation: u64,
}

impl LssShutter {
    /// Shutter of `source`, e.g. `LTLHN:LS1:LST:`.
    pub fn new(prefix: &str, source: u8) -> Self {
        Self {
            source,
            prefix: format!("{prefix}LTLHN:LS{source}:LST:"),
            seen_generation: 0,
        }
    }

    /// Laser source number.
    pub fn source(&self) -> u8 {
        self.source
    }

    fn pv(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }

    /// `REQ` setpoint.
    pub fn request(&self) -> String {
        self.pv("REQ")
    }

    /// `OPN_RBV`.
    pub fn opened(&self) -> String {
        self.pv("OPN_RBV")
    }

    /// `CLS_RBV`.
    pub fn closed(&self) -> String {
        self.pv("CLS_RBV")
    }

    /// `LSS_RBV`.
    pub fn permission(&self) -> String {
        self.pv("LSS_RBV")
    }

    /// PV schema.
    pub fn schema(&self) -> PvSchema {
        let status = |doc: &str| {
            PvMetadata::new()
                .enum_strings(&FALSE_TRUE)
                .read_only()
                .doc(doc)
        };
        let mut schema = PvSchema::new();
        schema
            .pair(
                self.request(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&FALSE_TRUE)
                    .doc("User request to open"),
            )
            .add(self.opened(), PvValue::Enum(0), status("Open status"))
            .add(self.closed(), PvValue::Enum(0), status("Closed status"))
            .add(
                self.permission(),
                PvValue::Enum(0),
                PvMetadata::new()
                    .enum_strings(&FALSE_TRUE)
                    .doc("LSS Permission status"),
            );
        schema
    }

    /// PVs [`Self::simulate`] reads or writes.
    pub fn required_pvs(&self) -> [String; 4] {
        [self.request(), self.opened(), self.closed(), self.permission()]
    }

    /// Remember the current request so only later writes act.
    pub fn sync(&mut self, store: &dyn ValueStore) -> Result<(), SimError> {
        self.seen_generation = store.generation(&self.request())?;
        Ok(())
    }

    /// Apply a pending request write. The request readback always follows
    /// the write; `OPN_RBV`/`CLS_RBV` only change under permission.
    ///
    /// Returns true when the shutter moved.
    pub fn simulate(&mut self, store: &dyn ValueStore) -> Result<bool, SimError> {
        let snapshot = store.read(&self.request())?;
        if snapshot.generation == self.seen_generation {
            return Ok(false);
        }
        self.seen_generation = snapshot.generation;

        if !store.read_bool(&self.permission())? {
            return Ok(false);
        }
        let open = snapshot.value.as_bool().unwrap_or(false);
        store.update_if_differs(&self.opened(), PvValue::from(open))?;
        store.update_if_differs(&self.closed(), PvValue::from(!open))?;
        Ok(true)
    }
}

/// The LSS shutters of all laser sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LssShutters {
    shutters: Vec<LssShutter>,
}

impl LssShutters {
    /// One shutter per entry of `sources`.
    pub fn new(prefix: &str, sources: &[u8]) -> Self {
        Self {
            shutters: sources.iter().map(|s| LssShutter::new(prefix, *s)).collect(),
        }
    }

    /// PV schema of every shutter.
    pub fn schema(&self) -> PvSchema {
        let mut schema = PvSchema::new();
        for shutter in &self.shutters {
            schema.extend(shutter.schema());
        }
        schema
    }

    /// Shutter of `source`.
    pub fn get(&self, source: u8) -> Option<&LssShutter> {
        self.shutters.iter().find(|s| s.source == source)
    }

    /// All shutters.
    pub fn iter(&self) -> impl Iterator<Item = &LssShutter> {
        self.shutters.iter()
    }

    /// All shutters, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LssShutter> {
        self.shutters.iter_mut()
    }
}
