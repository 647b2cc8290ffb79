//! Simulated sensor node.
//!
//! [`SensorSimulator`] keeps a small random-walk model of the environment and,
//! on every tick, renders it as the bus reports a real sensor node would send.
//! Those reports are fed to [`BridgeCore::ingest`], so simulated readings are
//! decoded, validated and de-duplicated exactly like hardware ones.
//!
//! | Reading | Model |
//! |---|---|
//! | temperature | 18–28 °C, ±0.5 per tick |
//! | humidity | 30–70 %, ±2 per tick |
//! | light | 80 ± 10 by day (06–18h), 20 ± 10 at night |
//! | smoke | true with probability 0.001 |
//! | motion | one random location pulses with probability 0.1 |

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use hearth_kernel::BridgeCore;
use hearth_middleware::TopicTranslator;
use hearth_types::{BusMessage, DeviceState, FieldPath, SensorField};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TEMPERATURE_RANGE: RangeInclusive<f64> = 18.0..=28.0;
const TEMPERATURE_STEP: f64 = 0.5;
const HUMIDITY_RANGE: RangeInclusive<f64> = 30.0..=70.0;
const HUMIDITY_STEP: f64 = 2.0;
const DAYLIGHT_HOURS: RangeInclusive<u32> = 6..=18;
const DAY_LIGHT_LEVEL: f64 = 80.0;
const NIGHT_LIGHT_LEVEL: f64 = 20.0;
const LIGHT_JITTER: f64 = 10.0;
const SMOKE_PROBABILITY: f64 = 0.001;
const MOTION_PROBABILITY: f64 = 0.1;

pub struct SensorSimulator<R = StdRng> {
    rng: R,
    temperature: f64,
    humidity: f64,
    locations: Vec<String>,
    /// Location that reported motion on the previous tick.
    pulsed: Option<String>,
}

impl SensorSimulator<StdRng> {
    /// Start the walk from the readings in `state`.
    pub fn new(state: &DeviceState) -> Self {
        Self::with_rng(state, StdRng::from_entropy())
    }
}

impl<R: Rng> SensorSimulator<R> {
    pub fn with_rng(state: &DeviceState, rng: R) -> Self {
        Self {
            rng,
            temperature: clamp(state.sensors.temperature, &TEMPERATURE_RANGE),
            humidity: clamp(state.sensors.humidity, &HUMIDITY_RANGE),
            locations: state.security.motion.keys().cloned().collect(),
            pulsed: None,
        }
    }

    /// Advance the model one tick and render the reports for local `hour`.
    pub fn next_readings(&mut self, translator: &TopicTranslator, hour: u32) -> Vec<BusMessage> {
        self.temperature = clamp(
            self.temperature + self.rng.gen_range(-TEMPERATURE_STEP..=TEMPERATURE_STEP),
            &TEMPERATURE_RANGE,
        );
        self.humidity = clamp(
            self.humidity + self.rng.gen_range(-HUMIDITY_STEP..=HUMIDITY_STEP),
            &HUMIDITY_RANGE,
        );
        let base = if DAYLIGHT_HOURS.contains(&hour) {
            DAY_LIGHT_LEVEL
        } else {
            NIGHT_LIGHT_LEVEL
        };
        let light = clamp(base + self.rng.gen_range(-LIGHT_JITTER..=LIGHT_JITTER), &(0.0..=100.0));
        let smoke = self.rng.gen_bool(SMOKE_PROBABILITY);

        let mut reports = vec![
            (FieldPath::Sensor(SensorField::Temperature), round1(self.temperature).to_string()),
            (FieldPath::Sensor(SensorField::Humidity), round1(self.humidity).to_string()),
            (FieldPath::Sensor(SensorField::Light), round1(light).to_string()),
            (FieldPath::Sensor(SensorField::Smoke), smoke.to_string()),
        ];

        if let Some(previous) = self.pulsed.take() {
            reports.push((FieldPath::Motion(previous), "false".to_string()));
        }
        if self.rng.gen_bool(MOTION_PROBABILITY)
            && let Some(location) = self.locations.choose(&mut self.rng).cloned()
        {
            // A pulse on the same location overrides its reset above.
            reports.retain(|(path, _)| *path != FieldPath::Motion(location.clone()));
            reports.push((FieldPath::Motion(location.clone()), "true".to_string()));
            self.pulsed = Some(location);
        }

        reports
            .into_iter()
            .filter_map(|(path, payload)| {
                translator
                    .state_topic(&path)
                    .map(|topic| BusMessage::new(topic, payload))
            })
            .collect()
    }

    /// Publish readings into `core` every `period` until `cancel` fires.
    ///
    /// The first readings are produced one period after start.
    pub async fn run(mut self, core: Arc<BridgeCore>, period: Duration, cancel: CancellationToken) {
        info!(period_secs = period.as_secs_f64(), "sensor simulation started");
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let readings = self.next_readings(core.translator(), Local::now().hour());
                    let changed = readings
                        .iter()
                        .filter(|msg| core.ingest(&msg.topic, &msg.payload))
                        .count();
                    debug!(readings = readings.len(), changed, "simulated readings applied");
                }
            }
        }
        debug!("sensor simulation stopped");
    }
}

fn clamp(value: f64, range: &RangeInclusive<f64>) -> f64 {
    value.clamp(*range.start(), *range.end())
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(seed: u64) -> SensorSimulator<StdRng> {
        SensorSimulator::with_rng(&DeviceState::default(), StdRng::seed_from_u64(seed))
    }

    fn translator() -> TopicTranslator {
        TopicTranslator::new("home", Arc::new(hearth_types::Schema::default()))
    }

    fn reading(messages: &[BusMessage], topic: &str) -> Option<String> {
        messages
            .iter()
            .find(|m| m.topic == topic)
            .map(BusMessage::payload_text)
    }

    #[test]
    fn readings_stay_within_ranges() {
        let t = translator();
        let mut sim = simulator(7);
        for tick in 0..500 {
            let hour = tick % 24;
            let messages = sim.next_readings(&t, hour);
            let value = |topic| reading(&messages, topic).unwrap().parse::<f64>().unwrap();

            assert!(TEMPERATURE_RANGE.contains(&value("home/sensors/temperature")));
            assert!(HUMIDITY_RANGE.contains(&value("home/sensors/humidity")));
            let light = value("home/sensors/light");
            if DAYLIGHT_HOURS.contains(&hour) {
                assert!((70.0..=90.0).contains(&light), "day light {light}");
            } else {
                assert!((10.0..=30.0).contains(&light), "night light {light}");
            }
        }
    }

    #[test]
    fn temperature_walks_in_small_steps() {
        let t = translator();
        let mut sim = simulator(11);
        let mut previous = 22.0;
        for _ in 0..200 {
            let messages = sim.next_readings(&t, 12);
            let current: f64 = reading(&messages, "home/sensors/temperature")
                .unwrap()
                .parse()
                .unwrap();
            // Rounding to one decimal can add at most 0.05 on each side.
            assert!((current - previous).abs() <= TEMPERATURE_STEP + 0.1);
            previous = current;
        }
    }

    #[test]
    fn motion_pulses_are_reset_on_next_tick() {
        let t = translator();
        let mut sim = simulator(3);
        let mut pulses = 0;
        let mut pending: Option<String> = None;
        for _ in 0..300 {
            let messages = sim.next_readings(&t, 12);
            let motion: Vec<_> = messages
                .iter()
                .filter(|m| m.topic.contains("/motion_sensors/"))
                .collect();
            if let Some(topic) = pending.take() {
                let reset = motion.iter().find(|m| m.topic == topic).unwrap();
                // Either reset, or immediately pulsed again.
                let payload = reset.payload_text();
                assert!(payload == "false" || payload == "true");
            }
            for message in motion.iter().filter(|m| m.payload_text() == "true") {
                pulses += 1;
                pending = Some(message.topic.clone());
            }
            assert!(motion.iter().filter(|m| m.payload_text() == "true").count() <= 1);
        }
        assert!(pulses > 0, "expected at least one motion pulse in 300 ticks");
    }

    #[test]
    fn every_reading_decodes_through_translator() {
        let t = translator();
        let mut sim = simulator(42);
        for _ in 0..50 {
            for message in sim.next_readings(&t, 20) {
                assert!(
                    t.decode(&message.topic, &message.payload).is_some(),
                    "{} = {}",
                    message.topic,
                    message.payload_text()
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_feeds_the_core_until_cancelled() {
        let (core, _commands) = BridgeCore::new(DeviceState::default(), "home", 16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(simulator(5).run(
            Arc::clone(&core),
            Duration::from_secs(5),
            cancel.clone(),
        ));

        let before = core.sensors();
        tokio::time::sleep(Duration::from_secs(16)).await;
        let after = core.sensors();
        assert!(
            before.temperature != after.temperature
                || before.humidity != after.humidity
                || before.light != after.light,
            "simulation did not reach the core"
        );
        assert_eq!(after.temperature, core.snapshot().thermostat.temperature);

        cancel.cancel();
        task.await.unwrap();
    }
}
