use lanebus::Event;

/// Power draw of an idle instance, in watts.
const IDLE_WATTS: f64 = 20.0;
/// Power draw at full CPU utilization, in watts.
const MAX_WATTS: f64 = 180.0;
/// Time covered by one metrics sample, in hours (one minute).
const SAMPLE_HOURS: f64 = 1.0 / 60.0;
/// Grid carbon intensity, in grams of CO2e per watt-hour.
const GRID_INTENSITY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DemoTopic {
    MetricsCollected,
    EmissionsCalculated,
}

/// Resource usage sampled from one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsCollected {
    pub instance: String,
    pub cpu_percent: u8,
    pub memory_mib: u64,
}

impl MetricsCollected {
    /// Deterministic synthetic sample number `seq` for `instance`.
    pub fn sample(instance: impl Into<String>, seq: u64) -> Self {
        Self {
            instance: instance.into(),
            cpu_percent: u8::try_from(seq.wrapping_mul(37) % 101).unwrap_or(u8::MAX),
            memory_mib: 512 + seq.wrapping_mul(131) % 4096,
        }
    }

    /// Emissions attributable to this sample.
    pub fn estimate(&self) -> EmissionsCalculated {
        let load = f64::from(self.cpu_percent.min(100)) / 100.0;
        let watts = (MAX_WATTS - IDLE_WATTS).mul_add(load, IDLE_WATTS);
        EmissionsCalculated {
            instance: self.instance.clone(),
            grams_co2e: watts * SAMPLE_HOURS * GRID_INTENSITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmissionsCalculated {
    pub instance: String,
    pub grams_co2e: f64,
}

/// Every event the demo bus carries. The instance name is the ordering key.
#[derive(Debug, Clone, PartialEq)]
pub enum DemoEvent {
    MetricsCollected(MetricsCollected),
    EmissionsCalculated(EmissionsCalculated),
}

impl Event for DemoEvent {
    type Topic = DemoTopic;

    fn identifier(&self) -> &str {
        match self {
            Self::MetricsCollected(m) => &m.instance,
            Self::EmissionsCalculated(e) => &e.instance,
        }
    }

    fn topic(&self) -> DemoTopic {
        match self {
            Self::MetricsCollected(_) => DemoTopic::MetricsCollected,
            Self::EmissionsCalculated(_) => DemoTopic::EmissionsCalculated,
        }
    }
}
