//! End-to-end tests: dataset -> producer -> cache -> playback -> scene.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use indexmap::IndexMap;
use rodviz_core::{
    Color, Completion, Error, FrameMeshBundle, FrameProducer, GroupSpec, GroupingConfig,
    MeshBuilder, ObjectKind, ObjectSeries, PlaybackCache, PlaybackController, PlaybackState,
    ProducerEvent, SceneState, SnapshotRecorder, SnapshotStore, StepSnapshot, SweptTube, Viewer,
    VisualizationDataset,
};

fn rod_frames(frames: usize, points: usize) -> (Vec<Vec<Vec3>>, Vec<Vec<f32>>) {
    let positions = (0..frames)
        .map(|f| {
            (0..points)
                .map(|i| Vec3::new(i as f32, (f as f32 * 0.3).sin(), 0.0))
                .collect()
        })
        .collect();
    let radii = vec![vec![0.1; points - 1]; frames];
    (positions, radii)
}

fn single_rod(positions: Vec<Vec<Vec3>>, radii: Vec<Vec<f32>>) -> Arc<VisualizationDataset> {
    let frames = positions.len();
    let mut objects = IndexMap::new();
    objects.insert("rod1".to_string(), ObjectSeries::rod(positions, radii));
    let time = (0..frames).map(|f| f as f64 * 0.1).collect();
    Arc::new(VisualizationDataset::new(objects, time).unwrap())
}

fn produce(dataset: Arc<VisualizationDataset>) -> (Arc<PlaybackCache>, Completion, Vec<ProducerEvent>) {
    let mut producer = FrameProducer::spawn(MeshBuilder::<SweptTube>::default(), dataset).unwrap();
    let cache = producer.cache();
    while !producer.is_finished() {
        std::thread::yield_now();
    }
    let events = producer.poll_events();
    let completion = producer.join();
    (cache, completion, events)
}

fn appended_indices(events: &[ProducerEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ProducerEvent::FrameAppended { frame_index, .. } => Some(*frame_index),
            ProducerEvent::Completed(_) => None,
        })
        .collect()
}

#[test]
fn five_frame_rod_builds_and_seeks() {
    let (positions, radii) = rod_frames(5, 4);
    let (cache, completion, events) = produce(single_rod(positions, radii));

    assert!(matches!(completion, Completion::Finished { frames: 5 }));
    assert_eq!(cache.size(), 5);
    assert!(cache.is_complete());
    assert_eq!(appended_indices(&events), [0, 1, 2, 3, 4]);

    let completed = events
        .iter()
        .filter(|e| matches!(e, ProducerEvent::Completed(_)))
        .count();
    assert_eq!(completed, 1);

    let mut playback = PlaybackController::new(cache, PlaybackController::DEFAULT_INTERVAL);
    let last = playback.seek(4).unwrap();
    assert_eq!(last.frame_index, 4);
    assert_eq!(last.mesh("rod1").unwrap().point_count(), 4);
    assert_eq!(playback.current_frame(), 4);

    assert_eq!(playback.seek(10).unwrap().frame_index, 4);
    assert_eq!(playback.current_frame(), 4);
}

#[test]
fn bad_radius_length_stops_at_last_good_frame() {
    let (positions, mut radii) = rod_frames(5, 4);
    radii[2] = vec![0.1, 0.1];
    let (cache, completion, events) = produce(single_rod(positions, radii));

    assert_eq!(appended_indices(&events), [0, 1]);
    assert_eq!(cache.size(), 2);
    assert!(cache.is_complete());

    assert_eq!(completion.frames(), 2);
    match completion.error() {
        Some(Error::FrameBuildFailed {
            frame_index,
            object_name,
            cause,
        }) => {
            assert_eq!(*frame_index, 2);
            assert_eq!(object_name, "rod1");
            assert!(matches!(
                **cause,
                Error::ShapeMismatch { points: 4, radii: 2, frame: 2, .. }
            ));
        }
        other => panic!("expected FrameBuildFailed, got {other:?}"),
    }
}

#[test]
fn sphere_objects_fail_the_first_frame() {
    let (positions, radii) = rod_frames(3, 3);
    let mut objects = IndexMap::new();
    let mut series = ObjectSeries::rod(positions, radii);
    series.kind = ObjectKind::Sphere;
    objects.insert("ball".to_string(), series);
    let dataset = Arc::new(VisualizationDataset::new(objects, vec![0.0, 1.0, 2.0]).unwrap());

    let (cache, completion, _) = produce(dataset);
    assert_eq!(cache.size(), 0);
    assert!(matches!(
        completion.error(),
        Some(Error::FrameBuildFailed { frame_index: 0, .. })
    ));
}

#[test]
fn failure_in_a_later_object_keeps_the_frame_out() {
    let (good_positions, good_radii) = rod_frames(3, 4);
    let (bad_positions, mut bad_radii) = rod_frames(3, 4);
    bad_radii[1].pop();

    let mut objects = IndexMap::new();
    objects.insert("good".to_string(), ObjectSeries::rod(good_positions, good_radii));
    objects.insert("bad".to_string(), ObjectSeries::rod(bad_positions, bad_radii));
    let dataset = Arc::new(VisualizationDataset::new(objects, vec![0.0, 1.0, 2.0]).unwrap());

    let (cache, completion, _) = produce(dataset);
    assert_eq!(cache.size(), 1);
    assert!(matches!(
        completion.error(),
        Some(Error::FrameBuildFailed { frame_index: 1, object_name, .. }) if object_name == "bad"
    ));
}

#[test]
fn cancellation_keeps_a_contiguous_prefix() {
    let (positions, radii) = rod_frames(400, 64);
    let producer =
        FrameProducer::spawn(MeshBuilder::new(SweptTube::new(32)), single_rod(positions, radii))
            .unwrap();
    let cache = producer.cache();
    while cache.size() < 3 && !cache.is_complete() {
        std::thread::yield_now();
    }
    producer.cancel();
    producer.cancel();

    let completion = producer.join();
    let size = cache.size();
    assert_eq!(completion.frames(), size);
    assert!(size >= 3);
    for i in 0..size {
        assert_eq!(cache.get(i).unwrap().frame_index, i);
    }
    assert!(cache.get(size).is_err());
}

#[test]
fn out_of_order_append_is_rejected() {
    let cache = PlaybackCache::new(3);
    cache.append(FrameMeshBundle::new(0, 0.0)).unwrap();
    assert!(matches!(
        cache.append(FrameMeshBundle::new(2, 0.2)),
        Err(Error::OutOfOrderAppend { expected: 1, actual: 2 })
    ));
    cache.append(FrameMeshBundle::new(1, 0.1)).unwrap();
    cache.append(FrameMeshBundle::new(2, 0.2)).unwrap();
    assert_eq!(cache.size(), 3);
    assert_eq!(cache.get(1).unwrap().frame_index, 1);
}

#[test]
fn advance_at_watermark_is_noop_until_more_frames_arrive() {
    let cache = Arc::new(PlaybackCache::new(10));
    cache.append(FrameMeshBundle::new(0, 0.0)).unwrap();
    let mut playback = PlaybackController::new(Arc::clone(&cache), Duration::from_millis(40));
    playback.play(Instant::now());

    assert!(playback.advance().is_none());
    assert_eq!(playback.current_frame(), 0);
    assert_eq!(playback.state(), PlaybackState::Playing);
}

#[test]
fn playback_auto_pauses_on_final_frame() {
    let (positions, radii) = rod_frames(4, 3);
    let dataset = single_rod(positions, radii);
    let (cache, _, _) = produce(Arc::clone(&dataset));

    let mut scene = SceneState::new(&dataset);
    let mut playback = PlaybackController::new(cache, Duration::from_millis(40));
    if let Some(frame) = playback.current() {
        scene.render(&frame);
    }
    playback.play(Instant::now());

    let mut rendered = vec![0];
    while let Some(frame) = playback.advance() {
        rendered.push(frame.frame_index);
        scene.render(&frame);
    }
    assert_eq!(rendered, [0, 1, 2, 3]);
    assert_eq!(playback.state(), PlaybackState::Paused);
    assert_eq!(scene.time_label(), format!("Time: {:.4}", 3.0 * 0.1));

    // Playing again from the end starts over.
    assert_eq!(playback.play(Instant::now()).unwrap().frame_index, 0);
}

#[test]
fn stored_snapshots_replay_with_grouping() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::open(dir.path()).unwrap();
    for step in 0..3u64 {
        for name in ["ring", "rod"] {
            let snapshot = StepSnapshot {
                step: step * 10,
                time: step as f64,
                position: (0..5)
                    .map(|i| {
                        let a = i as f32 / 5.0 * std::f32::consts::TAU;
                        Vec3::new(a.cos(), a.sin(), step as f32)
                    })
                    .collect(),
                radius: vec![0.05; 4],
            };
            store.write(name, &snapshot).unwrap();
        }
    }

    let grouping = GroupingConfig::new()
        .with_group(
            "rings",
            GroupSpec {
                kind: ObjectKind::Rod,
                objects: vec!["ring".into()],
                color: Color::VIOLET,
                closed: true,
            },
        )
        .with_group(
            "rods",
            GroupSpec {
                kind: ObjectKind::Rod,
                objects: vec!["rod".into()],
                color: Color::GREEN,
                closed: false,
            },
        );
    let dataset = Arc::new(store.load_dataset(Some(&grouping)).unwrap());
    assert_eq!(dataset.time(), &[0.0, 1.0, 2.0]);

    let (cache, completion, _) = produce(dataset);
    assert!(matches!(completion, Completion::Finished { frames: 3 }));
    let frame = cache.get(2).unwrap();
    let ring = frame.mesh("ring").unwrap();
    let rod = frame.mesh("rod").unwrap();
    assert!(ring.closed);
    assert_eq!(ring.color, Color::VIOLET);
    assert!(ring.triangle_count() > rod.triangle_count());
}

#[test]
fn recorder_without_store_matches_store_round_trip() {
    struct Fixed(Vec<Vec3>, Vec<f32>);
    impl rodviz_core::RodSystem for Fixed {
        fn centerline(&self) -> &[Vec3] {
            &self.0
        }
        fn radii(&self) -> &[f32] {
            &self.1
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let rod = Fixed(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0.2, 0.3]);
    let mut recorder = SnapshotRecorder::new(3).with_store(SnapshotStore::open(dir.path()).unwrap());
    for step in 0..9 {
        recorder.make_callback("rod", &rod, step as f64, step).unwrap();
    }

    let in_memory = recorder.into_records();
    let on_disk = SnapshotStore::open(dir.path()).unwrap().load_records().unwrap();
    assert_eq!(in_memory, on_disk);
    assert_eq!(on_disk["rod"].time, vec![0.0, 3.0, 6.0]);
}
