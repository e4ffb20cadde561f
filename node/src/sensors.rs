use std::time::{SystemTime, UNIX_EPOCH};

use purifier_common::types::SensorSnapshot;

const MAX_STEP: f32 = 5.0;
const WALK_FLOOR: f32 = 1.0;
const WALK_CEIL: f32 = 100.0;

/// Synthetic readings standing in for the particulate/VOC/sound front-end:
/// seeded in realistic ranges, then walked a bounded step per refresh.
pub struct SensorSim {
    current: SensorSnapshot,
    rng: XorShift32,
}

impl SensorSim {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.subsec_nanos())
            .unwrap_or(0x9e37_79b9);
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: u32) -> Self {
        let mut rng = XorShift32::new(seed);
        let current = SensorSnapshot {
            temperature: rng.in_range(20.0, 30.0),
            humidity: rng.in_range(40.0, 60.0),
            pm1: rng.in_range(10.0, 30.0),
            pm25: rng.in_range(15.0, 35.0),
            pm10: rng.in_range(20.0, 40.0),
            voc: rng.in_range(5.0, 25.0),
            sound_level: rng.in_range(30.0, 50.0),
        };
        Self { current, rng }
    }

    /// One refresh cycle: every channel drifts by at most `MAX_STEP`.
    pub fn step(&mut self) -> SensorSnapshot {
        self.current.temperature = self.walk(self.current.temperature);
        self.current.humidity = self.walk(self.current.humidity);
        self.current.pm1 = self.walk(self.current.pm1);
        self.current.pm25 = self.walk(self.current.pm25);
        self.current.pm10 = self.walk(self.current.pm10);
        self.current.voc = self.walk(self.current.voc);
        self.current.sound_level = self.walk(self.current.sound_level);
        self.current
    }

    pub fn current(&self) -> SensorSnapshot {
        self.current
    }

    fn walk(&mut self, value: f32) -> f32 {
        let delta = (self.rng.next_unit() - 0.5) * 2.0 * MAX_STEP;
        (value + delta).clamp(WALK_FLOOR, WALK_CEIL)
    }
}

struct XorShift32(u32);

impl XorShift32 {
    fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    fn next_unit(&mut self) -> f32 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 17;
        self.0 ^= self.0 << 5;
        (self.0 >> 8) as f32 / (1u32 << 24) as f32
    }

    fn in_range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_unit() * (max - min)
    }
}
