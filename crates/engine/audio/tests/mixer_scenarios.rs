//! Layer mixing scenarios driven through the public API

use glam::Vec3;
use oldtom_audio::mixer::FEEDBACK_LAYER;
use oldtom_audio::{
    AcousticsConfig, AudioCategory, AudioLayer, Emotion, EmotionTracker, EmotionalState,
    InteractionEvent, LayerMixer, LayerState, MixerConfig, SpatialField,
};
use proptest::prelude::*;

const STEP: f32 = 0.05;

fn run(mixer: &mut LayerMixer, field: &mut SpatialField, seconds: f32) {
    let steps = (seconds / STEP).round() as usize;
    for _ in 0..steps {
        mixer.tick(field, STEP);
        field.tick(STEP);
    }
}

fn grouped_mixer() -> (LayerMixer, SpatialField) {
    let mut mixer = LayerMixer::new(MixerConfig::default());
    mixer
        .add_layer(
            AudioLayer::new("harbour-theme", AudioCategory::Music)
                .with_volume(0.4)
                .with_fade_time(1.0)
                .in_group("score"),
        )
        .unwrap();
    mixer
        .add_layer(
            AudioLayer::new("storm-theme", AudioCategory::Music)
                .with_volume(0.7)
                .with_fade_time(1.0)
                .in_group("score"),
        )
        .unwrap();
    (mixer, SpatialField::new(AcousticsConfig::default()))
}

#[test]
fn touch_ripple_cleans_up_after_itself() {
    let mut mixer = LayerMixer::new(MixerConfig::default());
    let mut field = SpatialField::new(AcousticsConfig::default());

    mixer.handle_interaction(
        &mut field,
        InteractionEvent::touch(Vec3::new(3.0, 0.0, 4.0), 0.8),
    );
    assert_eq!(mixer.feedback_count(&field), 1);

    let ripple = field
        .emitters_on_layer(FEEDBACK_LAYER)
        .next()
        .unwrap()
        .id()
        .to_string();
    assert_eq!(field.emitter(&ripple).unwrap().position(), Vec3::new(3.0, 0.0, 4.0));

    let mut last_volume = field.emitter(&ripple).unwrap().volume();
    for _ in 0..40 {
        mixer.tick(&mut field, STEP);
        field.tick(STEP);
        let volume = field.emitter(&ripple).unwrap().volume();
        assert!(volume <= last_volume);
        last_volume = volume;
    }

    run(&mut mixer, &mut field, 1.5);
    assert!(!field.contains(&ripple));
    assert_eq!(mixer.feedback_count(&field), 0);
}

#[test]
fn repeated_touches_leave_nothing_behind() {
    let mut mixer = LayerMixer::new(MixerConfig::default());
    let mut field = SpatialField::new(AcousticsConfig::default());

    for i in 0..5 {
        let x = i as f32;
        mixer.handle_interaction(&mut field, InteractionEvent::touch(Vec3::new(x, 0.0, 1.0), 0.5));
        run(&mut mixer, &mut field, 0.3);
    }
    assert_eq!(mixer.feedback_count(&field), 5);
    run(&mut mixer, &mut field, 4.0);
    assert_eq!(mixer.feedback_count(&field), 0);
}

#[test]
fn exclusion_group_keeps_one_layer_audible() {
    let (mut mixer, mut field) = grouped_mixer();

    mixer.play_layer(&mut field, "harbour-theme").unwrap();
    run(&mut mixer, &mut field, 1.2);
    mixer.play_layer(&mut field, "storm-theme").unwrap();
    run(&mut mixer, &mut field, 1.2);

    let active: Vec<&str> = mixer
        .layers()
        .filter(|ch| ch.layer().exclusion_group.as_deref() == Some("score"))
        .filter(|ch| ch.is_active())
        .map(|ch| ch.id())
        .collect();
    assert_eq!(active, vec!["storm-theme"]);
    assert_eq!(mixer.layer("harbour-theme").unwrap().state(), LayerState::Silent);
}

#[test]
fn group_switch_crossfades_without_jumps() {
    let (mut mixer, mut field) = grouped_mixer();

    mixer.play_layer(&mut field, "harbour-theme").unwrap();
    run(&mut mixer, &mut field, 1.2);
    assert!((mixer.layer("harbour-theme").unwrap().volume() - 0.4).abs() < 1e-6);

    mixer.play_layer(&mut field, "storm-theme").unwrap();
    let mut harbour = mixer.layer("harbour-theme").unwrap().volume();
    let mut storm = mixer.layer("storm-theme").unwrap().volume();
    assert_eq!(storm, 0.0);

    for _ in 0..22 {
        mixer.tick(&mut field, STEP);
        let h = mixer.layer("harbour-theme").unwrap().volume();
        let s = mixer.layer("storm-theme").unwrap().volume();
        assert!(h <= harbour && harbour - h <= 0.4 * STEP + 1e-4);
        assert!(s >= storm && s - storm <= 0.7 * STEP + 1e-4);
        harbour = h;
        storm = s;
    }

    assert_eq!(harbour, 0.0);
    assert!((storm - 0.7).abs() < 1e-6);
    assert_eq!(mixer.layer("storm-theme").unwrap().state(), LayerState::Audible);
}

#[test]
fn emergency_stop_spares_feedback() {
    let (mut mixer, mut field) = grouped_mixer();
    mixer.play_layer(&mut field, "harbour-theme").unwrap();
    run(&mut mixer, &mut field, 0.5);

    mixer.emergency_stop(&mut field);
    assert_eq!(mixer.layer("harbour-theme").unwrap().volume(), 0.0);
    assert_eq!(mixer.layer(FEEDBACK_LAYER).unwrap().state(), LayerState::Audible);
}

#[test]
fn calm_reading_raises_calm_layer() {
    let mut mixer = LayerMixer::new(MixerConfig::default());
    let mut field = SpatialField::new(AcousticsConfig::default());
    mixer
        .add_layer(
            AudioLayer::new("lullaby", AudioCategory::Music)
                .with_volume(0.5)
                .triggered_by_emotion(Emotion::Calm),
        )
        .unwrap();

    mixer.update_emotional_state(&mut field, EmotionalState::new(Emotion::Calm, 0.8));
    run(&mut mixer, &mut field, 1.5);
    let lullaby = mixer.layer("lullaby").unwrap();
    assert_eq!(lullaby.state(), LayerState::Audible);
    assert!(lullaby.volume() > 0.0);
}

#[test]
fn important_layer_ducks_lesser_ones_while_it_sounds() {
    let mut mixer = LayerMixer::new(MixerConfig::default());
    let mut field = SpatialField::new(AcousticsConfig::default());
    for (id, category, priority) in [
        ("narrator", AudioCategory::Voice, 0),
        ("sea-shanty", AudioCategory::Music, 9),
    ] {
        mixer
            .add_layer(
                AudioLayer::new(id, category)
                    .with_volume(1.0)
                    .with_fade_time(0.5)
                    .with_priority(priority),
            )
            .unwrap();
    }

    mixer.play_layer(&mut field, "narrator").unwrap();
    mixer.play_layer(&mut field, "sea-shanty").unwrap();
    run(&mut mixer, &mut field, 1.0);

    let duck = MixerConfig::default().duck_level;
    let shanty = mixer.layer("sea-shanty").unwrap();
    assert!(shanty.is_ducked());
    assert!((shanty.volume() - duck).abs() < 1e-4);
    assert!((mixer.layer("narrator").unwrap().volume() - 1.0).abs() < 1e-6);

    mixer.stop_layer("narrator").unwrap();
    run(&mut mixer, &mut field, 1.0);
    let shanty = mixer.layer("sea-shanty").unwrap();
    assert!(!shanty.is_ducked());
    assert!((shanty.volume() - 1.0).abs() < 1e-4);
    assert_eq!(mixer.layer("narrator").unwrap().state(), LayerState::Silent);
}

#[test]
fn always_open_feedback_layer_ducks_nothing() {
    let (mut mixer, mut field) = grouped_mixer();
    mixer.play_layer(&mut field, "storm-theme").unwrap();
    run(&mut mixer, &mut field, 1.5);
    let storm = mixer.layer("storm-theme").unwrap();
    assert!(!storm.is_ducked());
    assert!((storm.volume() - 0.7).abs() < 1e-5);
}

proptest! {
    #[test]
    fn smoothed_intensity_moves_a_bounded_step(
        smoothing in 0.05f32..1.0,
        readings in prop::collection::vec(0.0f32..=1.0, 1..40),
    ) {
        let mut tracker = EmotionTracker::new(smoothing, 16);
        for reading in readings {
            let before = tracker.current().intensity;
            let after = tracker.update(EmotionalState::new(Emotion::Wonder, reading)).intensity;
            let allowed = smoothing * (reading - before).abs();
            prop_assert!((after - before).abs() <= allowed + 1e-5);
            prop_assert!((0.0..=1.0).contains(&after));
            // never overshoots the reading
            prop_assert!((after - reading).abs() <= (before - reading).abs() + 1e-5);
        }
        prop_assert!(tracker.history_len() <= 16);
    }
}
