//! Performance governor behaviour under sustained pressure

use oldtom_audio::{
    AudioEngine, AudioEngineConfig, BatteryStatus, CapabilityFlags, CapabilityProbe,
    DeviceCapabilities, GovernorConfig, OptimizationProfile, OptimizationReason,
    PerformanceGovernor, ProcessingTier, Result,
};
use proptest::prelude::*;

struct TabletProbe;

impl CapabilityProbe for TabletProbe {
    fn hardware_concurrency(&self) -> Result<usize> {
        Ok(8)
    }

    fn memory_mb(&self) -> Result<u64> {
        Ok(8_192)
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

fn flags() -> impl Strategy<Value = CapabilityFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(spatial, realtime, accel)| {
        CapabilityFlags {
            spatial_audio: spatial,
            realtime_analysis: realtime,
            hardware_acceleration: accel,
        }
    })
}

proptest! {
    #[test]
    fn same_device_same_profile(
        cores in 0usize..32,
        memory in 0u64..32_768,
        flags in flags(),
    ) {
        let a = DeviceCapabilities::new(cores, memory, 48_000, flags);
        let b = DeviceCapabilities::new(cores, memory, 44_100, flags);
        prop_assert_eq!(a.profile(), b.profile());
        prop_assert_eq!(a.max_emitters, a.tier.max_emitters());

        let governor = PerformanceGovernor::new(GovernorConfig::default(), a.clone());
        prop_assert_eq!(*governor.settings(), a.profile().settings());
    }

    #[test]
    fn more_hardware_never_lowers_the_tier(
        cores in 0usize..16,
        memory in 0u64..16_384,
        extra_cores in 0usize..8,
        extra_memory in 0u64..8_192,
    ) {
        let accel = CapabilityFlags { hardware_acceleration: true, ..CapabilityFlags::default() };
        let small = DeviceCapabilities::new(cores, memory, 48_000, accel);
        let big = DeviceCapabilities::new(cores + extra_cores, memory + extra_memory, 48_000, accel);
        prop_assert!(big.tier >= small.tier);
    }
}

#[test]
fn sustained_low_frame_rate_degrades_monotonically() {
    let config = GovernorConfig::default();
    let mut governor = PerformanceGovernor::new(
        config.clone(),
        DeviceCapabilities::new(8, 16_384, 48_000, CapabilityFlags {
            hardware_acceleration: true,
            ..CapabilityFlags::default()
        }),
    );
    assert_eq!(governor.profile(), OptimizationProfile::Ultra);
    governor.report_frame_rate(25.0);

    let mut last = *governor.settings();
    let mut downgrades = 0;
    for second in 0..60 {
        if let Some(update) = governor.check_optimization_needed(f64::from(second)) {
            assert!(update.reasons.contains(&OptimizationReason::LowFrameRate));
            downgrades += 1;
        }
        let now = *governor.settings();
        assert!(now.spatial_complexity <= last.spatial_complexity);
        assert!(now.audio_quality <= last.audio_quality);
        assert!(now.visual_detail <= last.visual_detail);
        assert!(now.spatial_complexity >= config.spatial_floor);
        assert!(now.audio_quality >= config.quality_floor);
        assert!(now.visual_detail >= config.visual_floor);
        last = now;
    }

    // one pass per cooldown window
    assert_eq!(downgrades, 12);
    // 25 fps is above the critical threshold
    assert!(last.realtime_processing);
    assert!((last.spatial_complexity - config.spatial_floor).abs() < 1e-6);
}

#[test]
fn adjustments_respect_the_cooldown() {
    let mut governor = PerformanceGovernor::new(GovernorConfig::default(), DeviceCapabilities::conservative());
    governor.report_frame_rate(10.0);
    assert!(governor.check_optimization_needed(0.0).is_some());
    assert!(!governor.settings().realtime_processing);
    assert!(governor.check_optimization_needed(4.9).is_none());
    assert!(governor.check_optimization_needed(5.0).is_some());
}

#[test]
fn critical_battery_cuts_realtime_processing() {
    let mut engine = AudioEngine::new(AudioEngineConfig::default());
    engine.init(&TabletProbe).unwrap();
    assert_eq!(engine.governor().unwrap().capabilities().tier, ProcessingTier::Ultra);
    assert!(engine.mixer().unwrap().config().realtime);

    engine
        .report_battery(BatteryStatus {
            level: 0.10,
            charging: false,
        })
        .unwrap();

    let settings = *engine.governor().unwrap().settings();
    assert!(!settings.realtime_processing);
    assert!(settings.audio_quality <= 0.6);
    assert!(settings.spatial_complexity <= 0.5);
    assert!(!engine.mixer().unwrap().config().realtime);
    assert_eq!(engine.field().unwrap().max_sources(), 32);
}

#[test]
fn charging_battery_changes_nothing() {
    let mut engine = AudioEngine::new(AudioEngineConfig::default());
    engine.init(&TabletProbe).unwrap();
    let before = *engine.governor().unwrap().settings();
    engine
        .report_battery(BatteryStatus {
            level: 0.05,
            charging: true,
        })
        .unwrap();
    assert_eq!(*engine.governor().unwrap().settings(), before);
}

#[test]
fn critical_battery_caps_again_after_reoptimize() {
    let capabilities = DeviceCapabilities::new(8, 8_192, 48_000, CapabilityFlags {
        spatial_audio: true,
        realtime_analysis: true,
        hardware_acceleration: true,
    });
    let mut governor = PerformanceGovernor::new(GovernorConfig::default(), capabilities);
    let mut updates = governor.subscribe();
    let critical = BatteryStatus {
        level: 0.10,
        charging: false,
    };

    governor.report_battery(critical);
    assert!(!governor.settings().realtime_processing);

    governor.reoptimize(0.0);
    assert!(governor.settings().realtime_processing);

    governor.report_battery(critical);
    let settings = *governor.settings();
    assert!(!settings.realtime_processing);
    assert!(settings.audio_quality <= 0.6);
    assert!(settings.spatial_complexity <= 0.5);

    let reasons: Vec<OptimizationReason> = updates
        .drain()
        .into_iter()
        .flat_map(|update| update.reasons)
        .collect();
    assert_eq!(
        reasons,
        vec![
            OptimizationReason::BatteryCritical,
            OptimizationReason::Reoptimized,
            OptimizationReason::BatteryCritical,
        ]
    );

    // Already capped: a repeat report changes nothing and stays quiet
    governor.report_battery(critical);
    assert_eq!(*governor.settings(), settings);
    assert!(updates.drain().is_empty());
}
