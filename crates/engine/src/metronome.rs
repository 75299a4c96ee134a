use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{OutputEndpoint, ToneBurst};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickSettings {
    pub bpm: f64,
    pub frequency_hz: f64,
    pub duration_ms: u64,
    pub gain: f32,
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self {
            bpm: 100.0,
            frequency_hz: 950.0,
            duration_ms: 50,
            gain: 0.08,
        }
    }
}

impl ClickSettings {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm.max(1.0))
    }

    fn click(&self, sample_rate: u32) -> ToneBurst {
        ToneBurst::new(
            self.frequency_hz,
            self.duration_ms as f64 / 1000.0,
            self.gain,
            sample_rate,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeState {
    Stopped,
    Running,
}

/// Periodic click generator. It only shares the output endpoint with playback.
///
/// Starting spawns a task on the current tokio runtime; the first click sounds
/// one period after the start.
pub struct Metronome {
    settings: ClickSettings,
    task: Option<JoinHandle<()>>,
}

impl Metronome {
    pub fn new(settings: ClickSettings) -> Self {
        Self {
            settings,
            task: None,
        }
    }

    pub fn settings(&self) -> ClickSettings {
        self.settings
    }

    pub fn state(&self) -> MetronomeState {
        if self.task.is_some() {
            MetronomeState::Running
        } else {
            MetronomeState::Stopped
        }
    }

    pub fn toggle(&mut self, output: Arc<dyn OutputEndpoint>) -> MetronomeState {
        match self.state() {
            MetronomeState::Running => self.stop(),
            MetronomeState::Stopped => self.start(output),
        }
        self.state()
    }

    pub fn start(&mut self, output: Arc<dyn OutputEndpoint>) {
        if self.task.is_some() {
            return;
        }

        let settings = self.settings;
        let period = settings.period();
        self.task = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                let click = settings.click(output.sample_rate());
                if let Err(err) = output.play(Box::new(click)) {
                    log::warn!("metronome click dropped: {err}");
                }
            }
        }));
        log::info!("metronome started at {} bpm", settings.bpm);
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("metronome stopped");
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OfflineOutput;

    #[tokio::test(start_paused = true)]
    async fn test_toggle_runs_and_stops_clicks() {
        let output = Arc::new(OfflineOutput::new(48000, 2));
        let mut metronome = Metronome::new(ClickSettings::default());
        assert_eq!(metronome.state(), MetronomeState::Stopped);

        assert_eq!(metronome.toggle(output.clone()), MetronomeState::Running);
        // 100 bpm: clicks at 600 ms and 1200 ms
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(output.voices_started(), 2);

        assert_eq!(metronome.toggle(output.clone()), MetronomeState::Stopped);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(output.voices_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_is_a_short_tone() {
        let output = Arc::new(OfflineOutput::new(48000, 1));
        let mut metronome = Metronome::new(ClickSettings::default());
        metronome.start(output.clone());
        tokio::time::sleep(Duration::from_millis(650)).await;
        metronome.stop();

        let rendered = output.render(4800);
        let peak = rendered.iter().fold(0.0f32, |p, s| p.max(s.abs()));
        assert!(peak > 0.07 && peak <= 0.08 + 1e-6);
        assert!(rendered[2400..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_period() {
        let period = ClickSettings::default().period();
        assert!((period.as_secs_f64() - 0.6).abs() < 1e-6);
    }
}
