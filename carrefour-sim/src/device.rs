//! Simulated roadside installation: ultrasonic distance sensing against a
//! calibrated baseline, three-color head cycling with the applied timings,
//! tilt sensing and the ambient-light street lamp.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// Fixed red duration; green and yellow come from the applied configuration
const RED_MS: u64 = 8000;
/// Consecutive below-threshold readings before congestion is declared
const CONGESTION_ONSET_TICKS: u32 = 3;
/// Clearance margin above the threshold before congestion is released
const CLEAR_MARGIN_CM: f64 = 15.0;
/// Simulated day/night period, in ticks (one tick per second)
const DAY_CYCLE_TICKS: u64 = 240;

/// One emitted `traffic_data` row, in the exact wire shape the store expects
#[derive(Debug, Clone, Serialize)]
pub struct EmittedSample {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub event_type: String,
    pub congestion: bool,
    pub light_main: Option<&'static str>,
    pub tilt_detected: bool,
    pub street_light_on: bool,
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub baseline_cm: f64,
    pub threshold_cm: f64,
    pub distance_cm: f64,
    pub cfg_green_ms: u64,
    pub cfg_yellow_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LightPhase {
    Green,
    Yellow,
    Red,
}

impl LightPhase {
    fn as_str(self) -> &'static str {
        match self {
            LightPhase::Green => "green",
            LightPhase::Yellow => "yellow",
            LightPhase::Red => "red",
        }
    }
}

pub struct TrafficDevice {
    rng: u64,
    tick_count: u64,
    baseline_cm: f64,
    threshold_cm: f64,
    distance_cm: f64,
    below_threshold_ticks: u32,
    congested: bool,
    phase: LightPhase,
    phase_elapsed_ms: u64,
    green_ms: u64,
    yellow_ms: u64,
    tilt_ticks_left: u32,
    pitch_deg: f64,
    roll_deg: f64,
}

impl TrafficDevice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: seed | 1, // xorshift must not start at zero
            tick_count: 0,
            baseline_cm: 120.0,
            threshold_cm: 60.0,
            distance_cm: 120.0,
            below_threshold_ticks: 0,
            congested: false,
            phase: LightPhase::Green,
            phase_elapsed_ms: 0,
            green_ms: 10000,
            yellow_ms: 3000,
            tilt_ticks_left: 0,
            pitch_deg: 0.0,
            roll_deg: 0.0,
        }
    }

    /// New timings take effect on the next phase change, like the real
    /// controller (the dashboard shows them as "in effect" with a small lag)
    pub fn apply_config(&mut self, green_ms: u64, yellow_ms: u64) {
        self.green_ms = green_ms;
        self.yellow_ms = yellow_ms;
    }

    /// Boot row emitted once at startup, before the first tick
    pub fn boot(&mut self) -> EmittedSample {
        self.emit("boot")
    }

    /// Advance one second of device time and emit the resulting row
    pub fn tick(&mut self) -> EmittedSample {
        self.tick_count += 1;
        self.advance_light(1000);
        self.step_distance();
        self.step_tilt();

        let event = if self.tilt_ticks_left > 0 && self.pitch_deg.abs() >= 3.0 && !self.was_tilted()
        {
            "tilt"
        } else {
            match self.update_congestion() {
                Some(transition) => transition,
                None => "update",
            }
        };
        self.emit(event)
    }

    fn emit(&mut self, event_type: &str) -> EmittedSample {
        EmittedSample {
            id: Uuid::new_v4().to_string(),
            created_at: OffsetDateTime::now_utc(),
            event_type: event_type.to_string(),
            congestion: self.congested,
            light_main: Some(self.phase.as_str()),
            tilt_detected: self.tilt_ticks_left > 0,
            street_light_on: self.is_night(),
            pitch_deg: self.pitch_deg,
            roll_deg: self.roll_deg,
            baseline_cm: self.baseline_cm,
            threshold_cm: self.threshold_cm,
            distance_cm: self.distance_cm,
            cfg_green_ms: self.green_ms,
            cfg_yellow_ms: self.yellow_ms,
        }
    }

    fn advance_light(&mut self, elapsed_ms: u64) {
        self.phase_elapsed_ms += elapsed_ms;
        let phase_len = match self.phase {
            LightPhase::Green => self.green_ms,
            LightPhase::Yellow => self.yellow_ms,
            LightPhase::Red => RED_MS,
        };
        if self.phase_elapsed_ms >= phase_len {
            self.phase = match self.phase {
                LightPhase::Green => LightPhase::Yellow,
                LightPhase::Yellow => LightPhase::Red,
                LightPhase::Red => LightPhase::Green,
            };
            self.phase_elapsed_ms = 0;
        }
    }

    fn step_distance(&mut self) {
        // random walk with a pull back toward the calibrated baseline
        let wander = (self.next_rand() - 0.5) * 30.0;
        let reversion = (self.baseline_cm - self.distance_cm) * 0.1;
        self.distance_cm = (self.distance_cm + wander + reversion).clamp(5.0, self.baseline_cm + 20.0);
    }

    /// Hysteresis: a few consecutive low readings declare congestion, a
    /// clearly free lane releases it. Returns the transition event, if any.
    fn update_congestion(&mut self) -> Option<&'static str> {
        if self.distance_cm < self.threshold_cm {
            self.below_threshold_ticks += 1;
        } else {
            self.below_threshold_ticks = 0;
        }

        if !self.congested && self.below_threshold_ticks >= CONGESTION_ONSET_TICKS {
            self.congested = true;
            return Some("congestion");
        }
        if self.congested && self.distance_cm > self.threshold_cm + CLEAR_MARGIN_CM {
            self.congested = false;
            return Some("clear");
        }
        None
    }

    fn step_tilt(&mut self) {
        if self.tilt_ticks_left > 0 {
            self.tilt_ticks_left -= 1;
            if self.tilt_ticks_left == 0 {
                self.pitch_deg = 0.0;
                self.roll_deg = 0.0;
            }
            return;
        }
        // rare pole knock: a few seconds above the 3 degree alarm threshold
        if self.next_rand() < 0.005 {
            self.tilt_ticks_left = 4;
            self.pitch_deg = 3.0 + self.next_rand() * 3.0;
            self.roll_deg = (self.next_rand() - 0.5) * 2.0;
        }
    }

    fn was_tilted(&self) -> bool {
        // tilt_ticks_left is decremented before the event is classified, so
        // the freshly armed alarm reads 4 here and an ongoing one 3 or less
        self.tilt_ticks_left < 4
    }

    fn is_night(&self) -> bool {
        self.tick_count % DAY_CYCLE_TICKS >= DAY_CYCLE_TICKS / 2
    }

    /// xorshift64*, uniform in [0, 1)
    fn next_rand(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}
