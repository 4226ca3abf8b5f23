//! Reading, writing and editing whole track files

use approx::assert_abs_diff_eq;
use std::fmt::Write as _;
use std::path::Path;
use topo_track_lib::{
    BoundingBox, GeoPoint, SequenceItem, TimestampMode, TrackError, TrackPoints,
};

/// Track points in each of the two segments of the mesa hike
const SEGMENT_POINTS: [usize; 2] = [600, 663];

const MIN_LON: f64 = -106.25;
const MAX_LON: f64 = -106.23178;
const MIN_LAT: f64 = 35.88;
const MAX_LAT: f64 = 35.900488;

/// `(lat, lon, ele)` of every track point of the mesa hike, per segment,
/// laid out on a diagonal so its bounding box is known exactly
fn mesa_segments() -> Vec<Vec<(f64, f64, f64)>> {
    let total: usize = SEGMENT_POINTS.iter().sum();
    let mut i = 0;
    SEGMENT_POINTS
        .iter()
        .map(|count| {
            (0..*count)
                .map(|_| {
                    let f = i as f64 / (total - 1) as f64;
                    i += 1;
                    (
                        MIN_LAT + (MAX_LAT - MIN_LAT) * f,
                        MIN_LON + (MAX_LON - MIN_LON) * f,
                        1900.0 + 40.0 * (f * 12.0).sin(),
                    )
                })
                .collect()
        })
        .collect()
}

/// A two-segment hike with two waypoints
fn write_mesa_hike(path: &Path) {
    let mut gpx = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="35.8912" lon="-106.2411"><ele>2010</ele><name>Arch</name></wpt>
  <wpt lat="35.8801" lon="-106.2499"><name>Trailhead</name></wpt>
  <trk><name>Mesa Arch</name>
"#,
    );
    let mut i = 0;
    for (seg, points) in mesa_segments().iter().enumerate() {
        writeln!(gpx, "    <trkseg><name>Day {}</name>", seg + 1).unwrap();
        for (lat, lon, ele) in points {
            let (min, sec) = (i / 6 % 60, i * 10 % 60);
            writeln!(
                gpx,
                r#"      <trkpt lat="{lat:.7}" lon="{lon:.7}"><ele>{ele:.1}</ele><time>2023-04-02T{:02}:{min:02}:{sec:02}Z</time></trkpt>"#,
                9 + i / 360
            )
            .unwrap();
            i += 1;
        }
        gpx.push_str("    </trkseg>\n");
    }
    gpx.push_str("  </trk>\n</gpx>\n");
    std::fs::write(path, gpx).unwrap();
}

/// The same hike as a FeatureCollection, one LineString per day
fn write_mesa_hike_geojson(path: &Path) {
    let mut features = vec![
        r#"{"type": "Feature", "properties": {"name": "Arch"},
  "geometry": {"type": "Point", "coordinates": [-106.2411, 35.8912, 2010]}}"#
            .to_string(),
        r#"{"type": "Feature", "properties": {"name": "Trailhead"},
  "geometry": {"type": "Point", "coordinates": [-106.2499, 35.8801]}}"#
            .to_string(),
    ];
    for (seg, points) in mesa_segments().iter().enumerate() {
        let coordinates: Vec<String> = points
            .iter()
            .map(|(lat, lon, ele)| format!("[{lon:.7}, {lat:.7}, {ele:.1}]"))
            .collect();
        features.push(format!(
            r#"{{"type": "Feature", "properties": {{"name": "Mesa Arch:Day {}"}},
  "geometry": {{"type": "LineString", "coordinates": [{}]}}}}"#,
            seg + 1,
            coordinates.join(", ")
        ));
    }
    let json = format!(
        "{{\"type\": \"FeatureCollection\", \"features\": [\n{}\n]}}\n",
        features.join(",\n")
    );
    std::fs::write(path, json).unwrap();
}

fn assert_same_points(a: &TrackPoints, b: &TrackPoints) {
    let (a, b) = (coords(a), coords(b));
    assert_eq!(a.len(), b.len());
    for (i, (pa, pb)) in a.iter().zip(&b).enumerate() {
        match (pa, pb) {
            (Some((lat1, lon1)), Some((lat2, lon2))) => {
                assert_abs_diff_eq!(lat1, lat2, epsilon = 1e-5);
                assert_abs_diff_eq!(lon1, lon2, epsilon = 1e-5);
            }
            (None, None) => {}
            _ => panic!("entry {i} is a point in only one of the readings"),
        }
    }
}

fn labels(tracks: &TrackPoints) -> Vec<String> {
    tracks
        .segments()
        .iter()
        .filter_map(|s| s.label.map(str::to_string))
        .collect()
}

fn waypoints(tracks: &TrackPoints) -> Vec<(String, f64, f64, Option<f64>)> {
    let mut names: Vec<_> = tracks
        .waypoint_points()
        .map(|w| (w.name.clone().unwrap_or_default(), w.lon, w.lat, w.ele))
        .collect();
    names.sort_by(|x, y| x.0.cmp(&y.0));
    names
}

fn coords(tracks: &TrackPoints) -> Vec<Option<(f64, f64)>> {
    tracks
        .points()
        .iter()
        .map(|item| item.as_point().map(|p| (p.lat, p.lon)))
        .collect()
}

#[test]
fn test_mesa_hike_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesa-arch.gpx");
    write_mesa_hike(&path);

    let mut tracks = TrackPoints::new();
    let bbox = tracks.read_file(&path).unwrap().unwrap();

    assert_eq!(tracks.points().len(), 1265);
    assert_eq!(tracks.num_waypoints(), 2);
    let (lon, lat) = bbox.center().unwrap();
    assert_abs_diff_eq!(lon, -106.24089, epsilon = 1e-6);
    assert_abs_diff_eq!(lat, 35.890244, epsilon = 1e-6);

    let labels: Vec<_> = tracks.segments().iter().map(|s| s.label).collect();
    assert_eq!(labels, vec![Some("Mesa Arch:Day 1"), Some("Mesa Arch:Day 2")]);
    assert_eq!(tracks.filename_for_index(700), Some(path.as_path()));
}

#[test]
fn test_gpx_and_geojson_agree() {
    let dir = tempfile::tempdir().unwrap();
    let gpx_path = dir.path().join("mesa-arch.gpx");
    write_mesa_hike(&gpx_path);
    let mut from_gpx = TrackPoints::new();
    from_gpx.read_file(&gpx_path).unwrap();

    let json_path = dir.path().join("mesa-arch.geojson");
    write_mesa_hike_geojson(&json_path);
    let mut from_json = TrackPoints::new();
    let bbox = from_json.read_file(&json_path).unwrap().unwrap();

    assert_eq!(from_json.points().len(), 1265);
    let (lon, lat) = bbox.center().unwrap();
    assert_abs_diff_eq!(lon, -106.24089, epsilon = 1e-6);
    assert_abs_diff_eq!(lat, 35.890244, epsilon = 1e-6);
    assert_same_points(&from_gpx, &from_json);
    assert_eq!(labels(&from_gpx), labels(&from_json));
    assert_eq!(
        waypoints(&from_json),
        vec![
            ("Arch".to_string(), -106.2411, 35.8912, Some(2010.0)),
            ("Trailhead".to_string(), -106.2499, 35.8801, None)
        ]
    );
    assert_eq!(waypoints(&from_gpx), waypoints(&from_json));
}

#[test]
fn test_geojson_written_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let gpx_path = dir.path().join("mesa-arch.gpx");
    write_mesa_hike(&gpx_path);
    let mut from_gpx = TrackPoints::new();
    from_gpx.read_file(&gpx_path).unwrap();

    let json_path = dir.path().join("saved.geojson");
    from_gpx.save_geojson(&json_path, None).unwrap();
    let mut back = TrackPoints::new();
    back.read_file(&json_path).unwrap();

    assert_same_points(&from_gpx, &back);
    assert_eq!(labels(&from_gpx), labels(&back));
    assert_eq!(waypoints(&from_gpx), waypoints(&back));
}

#[test]
fn test_latin1_gpx() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("penasco.gpx");
    let mut gpx = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<gpx version="1.1" creator="old unit" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="36.17" lon="-105.68"><name>Pe"#
        .to_vec();
    gpx.push(0xF1);
    gpx.extend_from_slice(
        br#"asco</name></wpt>
  <trk><name>R"#,
    );
    gpx.push(0xED);
    gpx.extend_from_slice(
        br#"o Pueblo</name><trkseg>
    <trkpt lat="36.17" lon="-105.68"/><trkpt lat="36.18" lon="-105.69"/>
  </trkseg></trk>
</gpx>
"#,
    );
    std::fs::write(&path, gpx).unwrap();

    let mut tracks = TrackPoints::new();
    tracks.read_file(&path).unwrap();
    assert_eq!(tracks.num_points(), 2);
    let names: Vec<_> = tracks.waypoint_points().map(|w| w.name.clone()).collect();
    assert_eq!(names, vec![Some("Pe\u{f1}asco".to_string())]);
    assert!(labels(&tracks)[0].starts_with("R\u{ed}o Pueblo"));
}

#[test]
fn test_undecodable_text_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracks = TrackPoints::new();
    for name in ["latin1.gpx", "latin1.kml", "latin1.geojson"] {
        let path = dir.path().join(name);
        // No declaration, so these bytes must be UTF-8 and are not
        std::fs::write(&path, [b'<', b'g', b'>', 0xF1, 0xFF, b'<', b'/', b'g', b'>']).unwrap();
        let err = tracks.read_file(&path).unwrap_err();
        assert!(matches!(err, TrackError::Malformed { .. }), "{name}: {err:?}");
    }
    assert!(tracks.is_empty());
}

#[test]
fn test_gpx_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracks = TrackPoints::new();
    tracks.start_segment("Ridge");
    for i in 0..50 {
        let p = GeoPoint::new(35.5 + i as f64 * 1e-4, -106.3 - i as f64 * 1e-4)
            .with_elevation(2000.0 + i as f64);
        tracks.add_point(p, TimestampMode::None);
    }
    tracks.start_segment("Saddle");
    tracks.add_point(GeoPoint::new(35.6123456789, -106.1), TimestampMode::None);
    tracks.add_point(
        GeoPoint::new(35.7, -106.2).with_speed(1.25),
        TimestampMode::Explicit("2024-01-01T00:00:00Z".into()),
    );
    tracks.add_point(GeoPoint::new(35.55, -106.25).with_name("Spring"), TimestampMode::None);

    let path = dir.path().join("out.gpx");
    tracks.save_gpx(&path, None).unwrap();
    let mut back = TrackPoints::new();
    back.read_file(&path).unwrap();

    assert_eq!(back.segments().len(), tracks.segments().len());
    let (a, b) = (coords(&tracks), coords(&back));
    assert_eq!(a.len(), b.len());
    for (pa, pb) in a.iter().flatten().zip(b.iter().flatten()) {
        assert_abs_diff_eq!(pa.0, pb.0, epsilon = 1e-5);
        assert_abs_diff_eq!(pa.1, pb.1, epsilon = 1e-5);
    }

    let last = back.points().last().and_then(SequenceItem::as_point).unwrap();
    assert_eq!(last.speed, Some(1.25));
    assert_eq!(last.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
    assert_eq!(back.waypoint_points().next().and_then(|w| w.name.as_deref()), Some("Spring"));
}

#[test]
fn test_region_export() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("mesa-arch.gpx");
    write_mesa_hike(&src);
    let mut tracks = TrackPoints::new();
    tracks.read_file(&src).unwrap();

    // Corners in reverse order, covering the south-west end only
    let out = dir.path().join("trailhead.gpx");
    tracks
        .save_gpx_in_region(-106.245, 35.885, -106.26, 35.87, &out)
        .unwrap();
    let mut part = TrackPoints::new();
    let bbox = part.read_file(&out).unwrap().unwrap();
    assert!(part.num_points() > 0 && part.num_points() < tracks.num_points());
    assert!(bbox.maxlon <= -106.245 && bbox.maxlat <= 35.885);
    assert_eq!(part.num_waypoints(), 1);
}

#[test]
fn test_split_then_undo_restores_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mesa-arch.gpx");
    write_mesa_hike(&path);
    let mut tracks = TrackPoints::new();
    tracks.read_file(&path).unwrap();

    let before = tracks.points().to_vec();
    tracks.split_at(300).unwrap();
    assert_eq!(tracks.points().len(), before.len() + 1);
    assert_eq!(
        tracks.points()[300].segment_label(),
        Some("Mesa Arch:Day 2")
    );
    tracks.undo();
    assert_eq!(tracks.points(), before.as_slice());
}

#[test]
fn test_running_bounds_match_fold() {
    let points = [
        (35.1, -106.9),
        (36.4, -105.2),
        (34.8, -107.3),
        (35.9, -106.1),
    ];
    let mut tracks = TrackPoints::new();
    tracks.start_segment("s");
    for (n, &(lat, lon)) in points.iter().enumerate() {
        tracks.add_point(GeoPoint::new(lat, lon), TimestampMode::None);
        let mut folded = BoundingBox::new();
        for &(lat, lon) in &points[..=n] {
            folded.add_point(lat, lon);
        }
        assert_eq!(tracks.bounds(), Some(folded));
    }
}

#[test]
fn test_missing_and_unknown_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut tracks = TrackPoints::new();
    let err = tracks.read_file(dir.path().join("nope.gpx")).unwrap_err();
    assert!(err.is_not_found());

    let odd = dir.path().join("notes.txt");
    std::fs::write(&odd, "hello").unwrap();
    assert!(!tracks.read_file(&odd).unwrap_err().is_not_found());
    assert!(tracks.is_empty());
}
