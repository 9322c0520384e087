//! Performance governor
//!
//! Keeps audio and visuals inside the device's real-time budget. A capability
//! snapshot taken once at startup picks an [`OptimizationProfile`]; observed
//! metrics then degrade the continuous [`AdaptiveSettings`] on a cooldown.
//! Battery brackets and background transitions act immediately.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{EventBus, EventStream};
use crate::{Error, Result};

/// Battery reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// Charge level (0.0 to 1.0)
    pub level: f32,
    pub charging: bool,
}

/// Optional platform features
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub spatial_audio: bool,
    pub realtime_analysis: bool,
    pub hardware_acceleration: bool,
}

/// Source of device facts; every query may be unsupported
pub trait CapabilityProbe {
    fn hardware_concurrency(&self) -> Result<usize>;
    /// Estimated device memory in megabytes
    fn memory_mb(&self) -> Result<u64>;
    fn sample_rate(&self) -> Result<u32>;
    fn flags(&self) -> Result<CapabilityFlags>;

    fn battery(&self) -> Result<BatteryStatus> {
        Err(Error::CapabilityUnavailable("battery".into()))
    }
}

/// Processing-power bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl ProcessingTier {
    /// Default max concurrent emitters
    pub fn max_emitters(&self) -> usize {
        match self {
            ProcessingTier::Low => 8,
            ProcessingTier::Medium => 16,
            ProcessingTier::High => 32,
            ProcessingTier::Ultra => 64,
        }
    }

    pub fn profile(&self) -> OptimizationProfile {
        match self {
            ProcessingTier::Low => OptimizationProfile::Performance,
            ProcessingTier::Medium => OptimizationProfile::Balanced,
            ProcessingTier::High => OptimizationProfile::High,
            ProcessingTier::Ultra => OptimizationProfile::Ultra,
        }
    }
}

/// Device capability snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub sample_rate: u32,
    pub hardware_concurrency: usize,
    pub memory_mb: u64,
    pub tier: ProcessingTier,
    pub max_emitters: usize,
    pub flags: CapabilityFlags,
}

impl DeviceCapabilities {
    /// Build a snapshot from raw facts
    pub fn new(hardware_concurrency: usize, memory_mb: u64, sample_rate: u32, flags: CapabilityFlags) -> Self {
        let tier = Self::bucket(hardware_concurrency, memory_mb, flags);
        Self {
            sample_rate,
            hardware_concurrency,
            memory_mb,
            tier,
            max_emitters: tier.max_emitters(),
            flags,
        }
    }

    /// Query a probe; any failing step falls back to a conservative value
    pub fn detect(probe: &dyn CapabilityProbe) -> Self {
        let cores = probe.hardware_concurrency().unwrap_or_else(|e| {
            warn!("Hardware concurrency unavailable ({}), assuming 2", e);
            2
        });
        let memory = probe.memory_mb().unwrap_or_else(|e| {
            warn!("Device memory unavailable ({}), assuming 1024 MB", e);
            1024
        });
        let sample_rate = probe.sample_rate().unwrap_or_else(|e| {
            warn!("Sample rate unavailable ({}), assuming 44100", e);
            44_100
        });
        let flags = probe.flags().unwrap_or_else(|e| {
            warn!("Feature detection unavailable ({}), assuming none", e);
            CapabilityFlags::default()
        });
        let caps = Self::new(cores, memory, sample_rate, flags);
        info!(
            "Device: {} cores, {} MB, {} Hz -> {:?} tier",
            caps.hardware_concurrency, caps.memory_mb, caps.sample_rate, caps.tier
        );
        caps
    }

    /// Snapshot used when nothing can be detected
    pub fn conservative() -> Self {
        Self::new(2, 1024, 44_100, CapabilityFlags::default())
    }

    fn bucket(cores: usize, memory_mb: u64, flags: CapabilityFlags) -> ProcessingTier {
        let tier = if cores >= 8 && memory_mb >= 8192 {
            ProcessingTier::Ultra
        } else if cores >= 4 && memory_mb >= 4096 {
            ProcessingTier::High
        } else if cores >= 2 && memory_mb >= 2048 {
            ProcessingTier::Medium
        } else {
            ProcessingTier::Low
        };
        // Software rendering never gets the top tier
        if tier == ProcessingTier::Ultra && !flags.hardware_acceleration {
            ProcessingTier::High
        } else {
            tier
        }
    }

    pub fn profile(&self) -> OptimizationProfile {
        self.tier.profile()
    }
}

/// Named quality/capacity bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationProfile {
    Performance,
    Balanced,
    High,
    Ultra,
}

impl OptimizationProfile {
    pub fn id(&self) -> &'static str {
        match self {
            OptimizationProfile::Performance => "performance",
            OptimizationProfile::Balanced => "balanced",
            OptimizationProfile::High => "high",
            OptimizationProfile::Ultra => "ultra",
        }
    }

    /// Starting adaptive settings
    pub fn settings(&self) -> AdaptiveSettings {
        let (audio_quality, spatial_complexity, realtime, detail, haptics) = match self {
            OptimizationProfile::Performance => (0.5, 0.4, false, 0.4, false),
            OptimizationProfile::Balanced => (0.75, 0.7, true, 0.7, true),
            OptimizationProfile::High => (0.9, 0.9, true, 0.9, true),
            OptimizationProfile::Ultra => (1.0, 1.0, true, 1.0, true),
        };
        AdaptiveSettings {
            audio_quality,
            spatial_complexity,
            realtime_processing: realtime,
            background_audio: true,
            visual_detail: detail,
            haptics,
        }
    }

    /// Update rate of spatial parameters in Hz
    pub fn update_rate_hz(&self) -> f32 {
        match self {
            OptimizationProfile::Performance => 15.0,
            OptimizationProfile::Balanced => 30.0,
            OptimizationProfile::High | OptimizationProfile::Ultra => 60.0,
        }
    }
}

/// Continuously adjustable quality settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    /// 0.0 to 1.0
    pub audio_quality: f32,
    /// 0.0 to 1.0; scales the concurrent spatial source cap
    pub spatial_complexity: f32,
    /// Real-time frequency analysis and signal-driven mixing
    pub realtime_processing: bool,
    pub background_audio: bool,
    /// Visual indicator detail (0.0 to 1.0)
    pub visual_detail: f32,
    pub haptics: bool,
}

/// Latest observed metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub frame_rate: f32,
    /// Fraction of the estimated memory ceiling (0.0 to 1.0)
    pub memory_usage: Option<f32>,
    pub battery: Option<BatteryStatus>,
    /// Dropouts since the last adjustment
    pub dropouts: u32,
    pub interaction_latency_ms: f32,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            memory_usage: None,
            battery: None,
            dropouts: 0,
            interaction_latency_ms: 0.0,
        }
    }
}

/// Governor tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Minimum seconds between metric-driven adjustments
    pub cooldown: f64,
    pub min_frame_rate: f32,
    /// Below this, real-time analysis is switched off
    pub critical_frame_rate: f32,
    pub max_memory_usage: f32,
    pub low_battery: f32,
    pub max_latency_ms: f32,
    pub spatial_step: f32,
    pub spatial_floor: f32,
    pub quality_step: f32,
    pub quality_floor: f32,
    pub visual_step: f32,
    pub visual_floor: f32,
    pub critical_battery: f32,
    pub soft_battery: f32,
    pub critical_quality_cap: f32,
    pub critical_spatial_cap: f32,
    pub soft_quality_cap: f32,
    pub soft_spatial_cap: f32,
    /// Delay before foreground restores settings (seconds)
    pub restore_delay: f64,
    pub background_visual_detail: f32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            cooldown: 5.0,
            min_frame_rate: 30.0,
            critical_frame_rate: 20.0,
            max_memory_usage: 0.8,
            low_battery: 0.2,
            max_latency_ms: 100.0,
            spatial_step: 0.8,
            spatial_floor: 0.3,
            quality_step: 0.9,
            quality_floor: 0.3,
            visual_step: 0.8,
            visual_floor: 0.2,
            critical_battery: 0.15,
            soft_battery: 0.30,
            critical_quality_cap: 0.6,
            critical_spatial_cap: 0.5,
            soft_quality_cap: 0.8,
            soft_spatial_cap: 0.7,
            restore_delay: 1.0,
            background_visual_detail: 0.1,
        }
    }
}

/// Why settings changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationReason {
    Initial,
    LowFrameRate,
    HighMemory,
    Dropouts,
    LowBattery,
    HighLatency,
    BatteryCritical,
    BatterySoft,
    Background,
    Foreground,
    Reoptimized,
}

/// Published whenever adaptive settings change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationUpdate {
    pub profile: OptimizationProfile,
    pub settings: AdaptiveSettings,
    pub reasons: Vec<OptimizationReason>,
}

/// Derived caps consulted by the field and mixer every tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecommendedAudioSettings {
    pub max_spatial_sources: usize,
    pub update_rate_hz: f32,
    pub reverb_enabled: bool,
    pub realtime_analysis: bool,
    /// Bus compressor ratio
    pub compression_ratio: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BatteryBracket {
    Critical,
    Soft,
    Normal,
}

/// Frame-rate sampler: counts frames, publishes a rate once per second
#[derive(Debug, Clone, Default)]
struct FrameSampler {
    window_start: Option<f64>,
    frames: u32,
}

impl FrameSampler {
    fn record(&mut self, now: f64) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;
        let span = now - start;
        if span >= 1.0 {
            let rate = (f64::from(self.frames - 1) / span) as f32;
            self.window_start = Some(now);
            self.frames = 1;
            Some(rate)
        } else {
            None
        }
    }
}

/// Quality controller
#[derive(Debug)]
pub struct PerformanceGovernor {
    config: GovernorConfig,
    capabilities: DeviceCapabilities,
    profile: OptimizationProfile,
    settings: AdaptiveSettings,
    metrics: PerformanceMetrics,
    sampler: FrameSampler,
    last_adjustment: Option<f64>,
    battery_bracket: BatteryBracket,
    background: bool,
    saved_settings: Option<AdaptiveSettings>,
    restore_at: Option<f64>,
    events: EventBus<OptimizationUpdate>,
}

impl PerformanceGovernor {
    pub fn new(config: GovernorConfig, capabilities: DeviceCapabilities) -> Self {
        let profile = capabilities.profile();
        let settings = profile.settings();
        debug!("Optimization profile: {}", profile.id());
        Self {
            config,
            capabilities,
            profile,
            settings,
            metrics: PerformanceMetrics::default(),
            sampler: FrameSampler::default(),
            last_adjustment: None,
            battery_bracket: BatteryBracket::Normal,
            background: false,
            saved_settings: None,
            restore_at: None,
            events: EventBus::new(),
        }
    }

    /// Detect capabilities through `probe` and start from the matching profile
    pub fn detect(config: GovernorConfig, probe: &dyn CapabilityProbe) -> Self {
        let capabilities = DeviceCapabilities::detect(probe);
        let mut governor = Self::new(config, capabilities);
        if let Ok(battery) = probe.battery() {
            governor.report_battery(battery);
        }
        governor
    }

    pub fn subscribe(&self) -> EventStream<OptimizationUpdate> {
        self.events.subscribe()
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn profile(&self) -> OptimizationProfile {
        self.profile
    }

    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    fn publish(&self, reasons: Vec<OptimizationReason>) {
        self.events.publish(OptimizationUpdate {
            profile: self.profile,
            settings: self.settings,
            reasons,
        });
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    /// Count one rendered frame at logical time `now`
    pub fn record_frame(&mut self, now: f64) {
        if let Some(rate) = self.sampler.record(now) {
            self.metrics.frame_rate = rate;
        }
    }

    pub fn report_frame_rate(&mut self, frame_rate: f32) {
        self.metrics.frame_rate = frame_rate.max(0.0);
    }

    pub fn report_memory_usage(&mut self, fraction: f32) {
        self.metrics.memory_usage = Some(fraction.clamp(0.0, 1.0));
    }

    pub fn report_dropout(&mut self) {
        self.metrics.dropouts += 1;
    }

    pub fn report_interaction_latency(&mut self, latency_ms: f32) {
        self.metrics.interaction_latency_ms = latency_ms.max(0.0);
    }

    /// Battery callback; every discharging report below a threshold enforces
    /// that bracket's caps, whatever the current settings are
    pub fn report_battery(&mut self, status: BatteryStatus) {
        self.metrics.battery = Some(status);

        let bracket = if status.charging {
            BatteryBracket::Normal
        } else if status.level < self.config.critical_battery {
            BatteryBracket::Critical
        } else if status.level < self.config.soft_battery {
            BatteryBracket::Soft
        } else {
            BatteryBracket::Normal
        };

        let entering_lower = bracket < self.battery_bracket;
        self.battery_bracket = bracket;

        let before = self.settings;
        let cfg = &self.config;
        let s = &mut self.settings;
        let reason = match bracket {
            BatteryBracket::Critical => {
                s.audio_quality = s.audio_quality.min(cfg.critical_quality_cap);
                s.spatial_complexity = s.spatial_complexity.min(cfg.critical_spatial_cap);
                s.realtime_processing = false;
                s.haptics = false;
                OptimizationReason::BatteryCritical
            }
            BatteryBracket::Soft => {
                s.audio_quality = s.audio_quality.min(cfg.soft_quality_cap);
                s.spatial_complexity = s.spatial_complexity.min(cfg.soft_spatial_cap);
                OptimizationReason::BatterySoft
            }
            BatteryBracket::Normal => return,
        };
        if !entering_lower && self.settings == before {
            return;
        }
        info!("Battery at {:.0}%: {:?}", status.level * 100.0, reason);
        self.publish(vec![reason]);
    }

    fn pressures(&self) -> Vec<OptimizationReason> {
        let cfg = &self.config;
        let m = &self.metrics;
        let mut reasons = Vec::new();
        if m.frame_rate < cfg.min_frame_rate {
            reasons.push(OptimizationReason::LowFrameRate);
        }
        if m.memory_usage.is_some_and(|u| u > cfg.max_memory_usage) {
            reasons.push(OptimizationReason::HighMemory);
        }
        if m.dropouts > 0 {
            reasons.push(OptimizationReason::Dropouts);
        }
        if m
            .battery
            .is_some_and(|b| !b.charging && b.level < cfg.low_battery)
        {
            reasons.push(OptimizationReason::LowBattery);
        }
        if m.interaction_latency_ms > cfg.max_latency_ms {
            reasons.push(OptimizationReason::HighLatency);
        }
        reasons
    }

    /// Run a downgrade pass if metrics demand it and the cooldown has passed
    pub fn check_optimization_needed(&mut self, now: f64) -> Option<OptimizationUpdate> {
        if self
            .last_adjustment
            .is_some_and(|last| now - last < self.config.cooldown)
        {
            return None;
        }
        let reasons = self.pressures();
        if reasons.is_empty() {
            return None;
        }

        let cfg = &self.config;
        let s = &mut self.settings;
        s.spatial_complexity = (s.spatial_complexity * cfg.spatial_step)
            .max(cfg.spatial_floor)
            .min(s.spatial_complexity);
        s.audio_quality = (s.audio_quality * cfg.quality_step)
            .max(cfg.quality_floor)
            .min(s.audio_quality);
        if self.metrics.frame_rate < cfg.critical_frame_rate {
            s.realtime_processing = false;
        }
        s.visual_detail = (s.visual_detail * cfg.visual_step)
            .max(cfg.visual_floor)
            .min(s.visual_detail);

        self.metrics.dropouts = 0;
        self.last_adjustment = Some(now);
        info!(
            "Downgrade ({:?}): quality {:.2}, spatial {:.2}",
            reasons, self.settings.audio_quality, self.settings.spatial_complexity
        );

        let update = OptimizationUpdate {
            profile: self.profile,
            settings: self.settings,
            reasons,
        };
        self.events.publish(update.clone());
        Some(update)
    }

    /// Reset to the profile's settings
    pub fn reoptimize(&mut self, now: f64) {
        self.settings = self.profile.settings();
        self.last_adjustment = Some(now);
        info!("Re-optimized to {} profile", self.profile.id());
        self.publish(vec![OptimizationReason::Reoptimized]);
    }

    // -------------------------------------------------------------------------
    // Lifecycle transitions
    // -------------------------------------------------------------------------

    /// Going to background degrades at once; returning restores after a delay
    pub fn set_background(&mut self, background: bool, now: f64) {
        if background == self.background {
            return;
        }
        self.background = background;

        if background {
            self.restore_at = None;
            if self.saved_settings.is_none() {
                self.saved_settings = Some(self.settings);
            }
            let s = &mut self.settings;
            s.realtime_processing = false;
            s.spatial_complexity *= 0.5;
            s.visual_detail = self.config.background_visual_detail;
            info!("Background: audio processing reduced");
            self.publish(vec![OptimizationReason::Background]);
        } else {
            self.restore_at = Some(now + self.config.restore_delay);
            debug!("Foreground: restoring in {:.1}s", self.config.restore_delay);
        }
    }

    /// Apply delayed work (foreground restore)
    pub fn tick(&mut self, now: f64) {
        if let Some(at) = self.restore_at {
            if now >= at {
                self.restore_at = None;
                if let Some(saved) = self.saved_settings.take() {
                    self.settings = saved;
                    info!("Foreground: settings restored");
                    self.publish(vec![OptimizationReason::Foreground]);
                }
            }
        }
    }

    /// Caps for the field and mixer
    pub fn recommended_audio_settings(&self) -> RecommendedAudioSettings {
        let s = &self.settings;
        let max = self.capabilities.max_emitters as f32;
        let mut update_rate = self.profile.update_rate_hz();
        if !s.realtime_processing {
            update_rate *= 0.5;
        }
        RecommendedAudioSettings {
            max_spatial_sources: ((s.spatial_complexity * max).floor() as usize).max(1),
            update_rate_hz: update_rate,
            reverb_enabled: s.audio_quality >= 0.6,
            realtime_analysis: s.realtime_processing && self.capabilities.flags.realtime_analysis,
            compression_ratio: if s.audio_quality < 0.6 {
                4.0
            } else if s.audio_quality < 0.85 {
                2.5
            } else {
                1.5
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProbe {
        cores: Option<usize>,
        memory: Option<u64>,
    }

    impl CapabilityProbe for FixedProbe {
        fn hardware_concurrency(&self) -> Result<usize> {
            self.cores
                .ok_or_else(|| Error::CapabilityUnavailable("cores".into()))
        }

        fn memory_mb(&self) -> Result<u64> {
            self.memory
                .ok_or_else(|| Error::CapabilityUnavailable("memory".into()))
        }

        fn sample_rate(&self) -> Result<u32> {
            Ok(48_000)
        }

        fn flags(&self) -> Result<CapabilityFlags> {
            Ok(CapabilityFlags {
                spatial_audio: true,
                realtime_analysis: true,
                hardware_acceleration: true,
            })
        }
    }

    fn governor() -> PerformanceGovernor {
        let caps = DeviceCapabilities::new(4, 4096, 48_000, CapabilityFlags::default());
        PerformanceGovernor::new(GovernorConfig::default(), caps)
    }

    #[test]
    fn tier_bucketing() {
        let flags = CapabilityFlags {
            hardware_acceleration: true,
            ..CapabilityFlags::default()
        };
        assert_eq!(DeviceCapabilities::new(1, 512, 44_100, flags).tier, ProcessingTier::Low);
        assert_eq!(DeviceCapabilities::new(2, 2048, 44_100, flags).tier, ProcessingTier::Medium);
        assert_eq!(DeviceCapabilities::new(4, 4096, 44_100, flags).tier, ProcessingTier::High);
        assert_eq!(DeviceCapabilities::new(8, 8192, 44_100, flags).tier, ProcessingTier::Ultra);
        assert_eq!(
            DeviceCapabilities::new(8, 8192, 44_100, CapabilityFlags::default()).tier,
            ProcessingTier::High
        );
    }

    #[test]
    fn failing_probe_degrades_to_conservative_tier() {
        let probe = FixedProbe {
            cores: None,
            memory: None,
        };
        let caps = DeviceCapabilities::detect(&probe);
        assert_eq!(caps.tier, ProcessingTier::Low);
        assert_eq!(caps.sample_rate, 48_000);
    }

    #[test]
    fn cooldown_limits_adjustments() {
        let mut gov = governor();
        gov.report_frame_rate(25.0);
        assert!(gov.check_optimization_needed(0.0).is_some());
        assert!(gov.check_optimization_needed(2.0).is_none());
        assert!(gov.check_optimization_needed(5.0).is_some());
    }

    #[test]
    fn healthy_metrics_do_nothing() {
        let mut gov = governor();
        assert!(gov.check_optimization_needed(0.0).is_none());
        assert_eq!(gov.settings(), &gov.profile().settings());
    }

    #[test]
    fn downgrade_order_and_floors() {
        let mut gov = governor();
        gov.report_frame_rate(15.0);
        let update = gov.check_optimization_needed(0.0).unwrap();
        assert!(update.reasons.contains(&OptimizationReason::LowFrameRate));
        assert!((update.settings.spatial_complexity - 0.72).abs() < 1e-5);
        assert!((update.settings.audio_quality - 0.81).abs() < 1e-5);
        assert!(!update.settings.realtime_processing);

        for i in 1..30 {
            gov.check_optimization_needed(i as f64 * 5.0);
        }
        assert!((gov.settings().spatial_complexity - 0.3).abs() < 1e-5);
        assert!((gov.settings().audio_quality - 0.3).abs() < 1e-5);
    }

    #[test]
    fn dropouts_are_consumed_by_a_pass() {
        let mut gov = governor();
        gov.report_dropout();
        assert!(gov.check_optimization_needed(0.0).is_some());
        assert!(gov.check_optimization_needed(10.0).is_none());
    }

    #[test]
    fn soft_battery_bracket_caps_softly() {
        let mut gov = governor();
        gov.report_battery(BatteryStatus {
            level: 0.25,
            charging: false,
        });
        assert!(gov.settings().audio_quality <= 0.8);
        assert!(gov.settings().realtime_processing);
    }

    #[test]
    fn battery_recovery_does_not_restore() {
        let mut gov = governor();
        gov.report_battery(BatteryStatus {
            level: 0.1,
            charging: false,
        });
        gov.report_battery(BatteryStatus {
            level: 0.9,
            charging: true,
        });
        assert!(!gov.settings().realtime_processing);
        assert!(gov.settings().audio_quality <= 0.6);
    }

    #[test]
    fn background_then_foreground_restores_after_delay() {
        let mut gov = governor();
        let before = *gov.settings();
        gov.set_background(true, 0.0);
        assert!(!gov.settings().realtime_processing);
        assert!((gov.settings().spatial_complexity - before.spatial_complexity * 0.5).abs() < 1e-6);

        gov.set_background(false, 10.0);
        gov.tick(10.5);
        assert!(!gov.settings().realtime_processing);
        gov.tick(11.0);
        assert_eq!(gov.settings(), &before);
    }

    #[test]
    fn recommended_caps_follow_spatial_complexity() {
        let gov = governor();
        let rec = gov.recommended_audio_settings();
        // High profile: 0.9 * 32
        assert_eq!(rec.max_spatial_sources, 28);
        assert!(rec.reverb_enabled);
        assert_eq!(rec.update_rate_hz, 60.0);
    }

    #[test]
    fn frame_sampler_reports_once_per_second() {
        let mut gov = governor();
        for i in 0..=24 {
            gov.record_frame(i as f64 / 24.0);
        }
        assert!((gov.metrics().frame_rate - 24.0).abs() < 0.5);
    }
}
