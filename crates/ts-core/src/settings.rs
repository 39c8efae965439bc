//! Per-run settings.
//!
//! `Settings` is the resolved, flat key/value set of one simulation run.
//! The JSON key names are the run keys of the configuration file
//! (`exec_numMotes`, `tsch_slotframeLength`, …).  Every key has a default;
//! [`Settings::validate`] rejects inconsistent combinations before any
//! event fires.

use serde::{Deserialize, Serialize};

use crate::{Eui64, SlotClock, TsError, TsResult};

// ── Enumerated settings ───────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnClass {
    FullyMeshed,
    Linear,
    Random,
    K7,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SfClass {
    #[serde(rename = "MSF")]
    Msf,
    #[serde(rename = "SFNone")]
    SfNone,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RplOf {
    #[serde(rename = "OF0")]
    Of0,
    #[serde(rename = "OFBestLinkPDR")]
    OfBestLinkPdr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppClass {
    AppPeriodic,
    AppBurst,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fragmentation {
    FragmentForwarding,
    PerHopReassembly,
}

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    // execution
    #[serde(rename = "exec_numMotes")]
    pub exec_num_motes: u32,
    /// Exactly one of this and `exec_minutes_per_run` must be set.
    #[serde(rename = "exec_numSlotframesPerRun", default)]
    pub exec_num_slotframes_per_run: Option<u64>,
    #[serde(rename = "exec_minutesPerRun", default)]
    pub exec_minutes_per_run: Option<f64>,
    #[serde(rename = "exec_randomSeed")]
    pub exec_random_seed: u64,
    pub force_initial_state: bool,
    /// Explicit EUI-64s, one per mote.  Empty means derive from mote ids.
    pub motes_eui64: Vec<Eui64>,

    // secure join
    pub secjoin_enabled: bool,
    pub secjoin_max_retries: u32,

    // application
    pub app: AppClass,
    #[serde(rename = "app_pkPeriod")]
    pub app_pk_period: f64,
    #[serde(rename = "app_pkPeriodVar")]
    pub app_pk_period_var: f64,
    #[serde(rename = "app_pkLength")]
    pub app_pk_length: u32,
    #[serde(rename = "app_burstTimestamp")]
    pub app_burst_timestamp: Option<f64>,
    #[serde(rename = "app_burstNumPackets")]
    pub app_burst_num_packets: u32,

    // rpl
    pub rpl_of: RplOf,
    #[serde(rename = "rpl_daoPeriod")]
    pub rpl_dao_period: f64,
    pub rpl_extensions: Vec<String>,
    #[serde(rename = "rpl_parentSwitchRankThreshold")]
    pub rpl_parent_switch_rank_threshold: u16,
    #[serde(rename = "rpl_ofBestLinkPdr_switchMargin")]
    pub rpl_of_best_link_pdr_switch_margin: f64,

    // 6lowpan
    pub fragmentation: Fragmentation,
    pub sixlowpan_reassembly_buffers_num: u32,
    pub fragmentation_ff_discard_vrb_entry_policy: Vec<String>,
    pub fragmentation_ff_vrb_table_size: u32,
    pub tsch_max_payload_len: u32,

    // scheduling function
    pub sf_class: SfClass,
    /// Seconds between MSF housekeeping rounds.
    #[serde(rename = "msf_housekeepingPeriod")]
    pub msf_housekeeping_period: f64,
    /// Cell utilization below which MSF deletes a negotiated cell.
    #[serde(rename = "msf_limNumCellsUsedLow")]
    pub msf_lim_num_cells_used_low: f64,
    /// Cell utilization above which MSF adds a negotiated cell.
    #[serde(rename = "msf_limNumCellsUsedHigh")]
    pub msf_lim_num_cells_used_high: f64,
    /// Transmissions on a cell before its PDR is trusted for relocation.
    #[serde(rename = "msf_minNumTx")]
    pub msf_min_num_tx: u32,
    #[serde(rename = "msf_relocatePdrThres")]
    pub msf_relocate_pdr_thres: f64,

    // tsch
    #[serde(rename = "tsch_slotDuration")]
    pub tsch_slot_duration: f64,
    #[serde(rename = "tsch_slotframeLength")]
    pub tsch_slotframe_length: u32,
    #[serde(rename = "tsch_probBcast_ebProb")]
    pub tsch_prob_bcast_eb_prob: f64,
    pub tsch_clock_max_drift_ppm: f64,
    pub tsch_clock_frequency: u32,
    /// Seconds between keep-alives; 0 disables them.
    pub tsch_keep_alive_interval: f64,
    /// Queue capacity; -1 means unbounded.
    pub tsch_tx_queue_size: i32,
    pub tsch_max_tx_retries: u32,
    pub tsch_hopping_sequence: Vec<u8>,
    pub tsch_pending_bit_enabled: bool,
    pub tsch_max_eb_delay: f64,
    pub tsch_num_neighbors_to_wait: u32,

    // radio
    /// Seconds between `radio.stats` records; 0 logs only at the end.
    pub radio_stats_log_period_s: f64,

    // connectivity
    pub conn_class: ConnClass,
    pub conn_trace: Option<String>,
    pub conn_simulate_ack_drop: bool,
    pub conn_random_square_side: f64,
    pub conn_random_init_min_pdr: f64,
    pub conn_random_init_min_neighbors: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            exec_num_motes:                     10,
            exec_num_slotframes_per_run:        Some(100),
            exec_minutes_per_run:               None,
            exec_random_seed:                   0,
            force_initial_state:                false,
            motes_eui64:                        Vec::new(),
            secjoin_enabled:                    true,
            secjoin_max_retries:                3,
            app:                                AppClass::AppPeriodic,
            app_pk_period:                      60.0,
            app_pk_period_var:                  0.05,
            app_pk_length:                      90,
            app_burst_timestamp:                None,
            app_burst_num_packets:              0,
            rpl_of:                             RplOf::Of0,
            rpl_dao_period:                     60.0,
            rpl_extensions:                     vec!["dis_unicast".to_string()],
            rpl_parent_switch_rank_threshold:   640,
            rpl_of_best_link_pdr_switch_margin: 0.1,
            fragmentation:                      Fragmentation::FragmentForwarding,
            sixlowpan_reassembly_buffers_num:   1,
            fragmentation_ff_discard_vrb_entry_policy: Vec::new(),
            fragmentation_ff_vrb_table_size:    50,
            tsch_max_payload_len:               90,
            sf_class:                           SfClass::Msf,
            msf_housekeeping_period:            60.0,
            msf_lim_num_cells_used_low:         0.25,
            msf_lim_num_cells_used_high:        0.75,
            msf_min_num_tx:                     100,
            msf_relocate_pdr_thres:             0.5,
            tsch_slot_duration:                 0.010,
            tsch_slotframe_length:              101,
            tsch_prob_bcast_eb_prob:            0.33,
            tsch_clock_max_drift_ppm:           30.0,
            tsch_clock_frequency:               32768,
            tsch_keep_alive_interval:           10.0,
            tsch_tx_queue_size:                 10,
            tsch_max_tx_retries:                5,
            tsch_hopping_sequence:              vec![16, 17, 23, 18, 26, 15, 25, 22, 19, 11, 12, 13, 24, 14, 20, 21],
            tsch_pending_bit_enabled:           false,
            tsch_max_eb_delay:                  180.0,
            tsch_num_neighbors_to_wait:         2,
            radio_stats_log_period_s:           60.0,
            conn_class:                         ConnClass::Random,
            conn_trace:                         None,
            conn_simulate_ack_drop:             false,
            conn_random_square_side:            2.0,
            conn_random_init_min_pdr:           0.5,
            conn_random_init_min_neighbors:     3,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON object of run keys.  Unknown keys are a
    /// configuration error.
    pub fn from_json(value: serde_json::Value) -> TsResult<Settings> {
        let settings: Settings =
            serde_json::from_value(value).map_err(|e| TsError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Every run key this struct consumes, in alphabetical order.
    pub fn known_keys() -> Vec<String> {
        match serde_json::to_value(Settings::default()) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn slot_clock(&self) -> SlotClock {
        SlotClock::new(self.tsch_slot_duration)
    }

    /// Total number of slots simulated: the terminal ASN of a successful run.
    pub fn total_slots(&self) -> u64 {
        match (self.exec_num_slotframes_per_run, self.exec_minutes_per_run) {
            (Some(n), _) => n * self.tsch_slotframe_length as u64,
            (None, Some(min)) => self.slot_clock().slots_for(min * 60.0),
            (None, None) => 0,
        }
    }

    pub fn has_rpl_extension(&self, name: &str) -> bool {
        self.rpl_extensions.iter().any(|e| e == name)
    }

    pub fn has_vrb_discard_policy(&self, name: &str) -> bool {
        self.fragmentation_ff_discard_vrb_entry_policy.iter().any(|e| e == name)
    }

    /// The EUI-64 of every mote, explicit or derived.
    pub fn mote_eui64s(&self) -> Vec<Eui64> {
        if self.motes_eui64.is_empty() {
            (0..self.exec_num_motes).map(|i| Eui64::from_mote_id(crate::MoteId(i))).collect()
        } else {
            self.motes_eui64.clone()
        }
    }

    /// Check cross-key consistency.
    pub fn validate(&self) -> TsResult<()> {
        match (self.exec_num_slotframes_per_run, self.exec_minutes_per_run) {
            (Some(_), Some(_)) => {
                return Err(TsError::Config(
                    "exec_numSlotframesPerRun and exec_minutesPerRun are mutually exclusive".into(),
                ));
            }
            (None, None) => {
                return Err(TsError::Config(
                    "one of exec_numSlotframesPerRun or exec_minutesPerRun is required".into(),
                ));
            }
            _ => {}
        }
        if self.exec_num_motes == 0 {
            return Err(TsError::Config("exec_numMotes must be at least 1".into()));
        }
        if self.tsch_slotframe_length == 0 {
            return Err(TsError::Config("tsch_slotframeLength must be positive".into()));
        }
        if self.tsch_slot_duration <= 0.0 {
            return Err(TsError::Config("tsch_slotDuration must be positive".into()));
        }
        if self.tsch_hopping_sequence.is_empty() {
            return Err(TsError::Config("tsch_hopping_sequence is empty".into()));
        }
        let mut seen = self.tsch_hopping_sequence.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.tsch_hopping_sequence.len() {
            return Err(TsError::Config("tsch_hopping_sequence has duplicate channels".into()));
        }
        if self.tsch_tx_queue_size < -1 {
            return Err(TsError::Config(format!(
                "tsch_tx_queue_size {} is invalid (use -1 for unbounded)",
                self.tsch_tx_queue_size
            )));
        }
        if !self.motes_eui64.is_empty() {
            if self.motes_eui64.len() != self.exec_num_motes as usize {
                return Err(TsError::Config(format!(
                    "motes_eui64 has {} entries for {} motes",
                    self.motes_eui64.len(),
                    self.exec_num_motes
                )));
            }
            let mut euis = self.motes_eui64.clone();
            euis.sort_unstable();
            euis.dedup();
            if euis.len() != self.motes_eui64.len() {
                return Err(TsError::Config("motes_eui64 entries are not unique".into()));
            }
        }
        match (self.conn_class, &self.conn_trace) {
            (crate::ConnClass::K7, None) => {
                return Err(TsError::Config("conn_class K7 requires conn_trace".into()));
            }
            (class, Some(_)) if class != crate::ConnClass::K7 => {
                return Err(TsError::Config(format!("conn_trace is only valid with K7, not {class:?}")));
            }
            _ => {}
        }
        for ext in &self.rpl_extensions {
            if ext != "dis_unicast" && ext != "dis_broadcast" {
                return Err(TsError::Config(format!("unsupported rpl extension {ext:?}")));
            }
        }
        for policy in &self.fragmentation_ff_discard_vrb_entry_policy {
            if policy != "last_fragment" && policy != "missing_fragment" {
                return Err(TsError::Config(format!("unsupported VRB discard policy {policy:?}")));
            }
        }
        if self.app == AppClass::AppBurst && self.app_burst_timestamp.is_none() {
            return Err(TsError::Config("AppBurst requires app_burstTimestamp".into()));
        }
        if !(0.0..=1.0).contains(&self.tsch_prob_bcast_eb_prob) {
            return Err(TsError::Config("tsch_probBcast_ebProb must be within [0, 1]".into()));
        }
        if self.msf_housekeeping_period <= 0.0 {
            return Err(TsError::Config("msf_housekeepingPeriod must be positive".into()));
        }
        let (low, high) = (self.msf_lim_num_cells_used_low, self.msf_lim_num_cells_used_high);
        if !(0.0 <= low && low < high && high <= 1.0) {
            return Err(TsError::Config(format!(
                "msf_limNumCellsUsedLow {low} and msf_limNumCellsUsedHigh {high} must satisfy 0 <= low < high <= 1"
            )));
        }
        if !(0.0..=1.0).contains(&self.msf_relocate_pdr_thres) {
            return Err(TsError::Config("msf_relocatePdrThres must be within [0, 1]".into()));
        }
        if self.sixlowpan_reassembly_buffers_num == 0 {
            return Err(TsError::Config("sixlowpan_reassembly_buffers_num must be at least 1".into()));
        }
        Ok(())
    }
}
