//! Introspection Engine Tests
//!
//! Runs the control, menu and format enumerations against scripted devices:
//! - Section grouping under control-class markers
//! - Menu enumeration over sparse menus
//! - Get/set round trips and kernel-side range rejection
//! - I/O errors kept apart from end-of-enumeration


use camera_test_utils::*;
use camwarden::camera::{CameraDevice, CameraKind};
use camwarden::v4l2::{
    get_capabilities, get_control_value, get_formats, query_controls, set_control, ControlType,
    MenuItem,
};
use camwarden::CamError;
use std::sync::Arc;

const ENODEV: i32 = 19;

#[test]
fn test_controls_grouped_by_class() {
    let dev = webcam("/dev/video0");
    let map = query_controls(&dev).unwrap();

    let names: Vec<_> = map.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["User Controls", "Camera Controls"]);

    let user: Vec<_> = map.sections[0].controls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(user, vec!["brightness", "contrast", "power_line_frequency"]);

    let camera: Vec<_> = map.sections[1].controls.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(camera, vec!["auto_exposure", "focus_absolute"]);

    // Class markers are never stored as controls
    assert!(map.iter().all(|c| c.kind != ControlType::CtrlClass));
    assert_eq!(map.len(), 5);
}

#[test]
fn test_query_controls_is_idempotent() {
    let dev = webcam("/dev/video0");
    let first = query_controls(&dev).unwrap();
    let second = query_controls(&dev).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_controls_before_any_class_marker() {
    let dev = FakeDevice::new("/dev/video3").with_integer(BRIGHTNESS, "Brightness", 0, 255, 128);
    let map = query_controls(&dev).unwrap();
    assert_eq!(map.sections.len(), 1);
    assert_eq!(map.sections[0].name, "");
    assert!(map.contains("brightness"));
}

#[test]
fn test_device_without_controls() {
    let dev = FakeDevice::new("/dev/video4");
    let map = query_controls(&dev).unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_menu_stops_at_first_missing_index() {
    let dev = FakeDevice::new("/dev/video0").with_menu(
        POWER_LINE_FREQUENCY,
        "Power Line Frequency",
        0,
        3,
        &[(0, "Disabled"), (1, "50 Hz"), (3, "Auto")],
    );
    let map = query_controls(&dev).unwrap();
    let ctrl = map.find("power_line_frequency").unwrap();

    assert_eq!(ctrl.kind, ControlType::Menu);
    let indices: Vec<u32> = ctrl.menu.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(ctrl.menu[1].1, MenuItem::Label("50 Hz".to_string()));
}

#[test]
fn test_set_then_get_round_trip() {
    let dev = webcam("/dev/video0");
    let map = query_controls(&dev).unwrap();

    for value in [-64, -1, 0, 17, 64] {
        assert!(set_control(&dev, &map, "brightness", value));
        assert_eq!(get_control_value(&dev, &map, "brightness").unwrap(), value);
    }
}

#[test]
fn test_out_of_range_set_is_rejected() {
    let dev = webcam("/dev/video0");
    let map = query_controls(&dev).unwrap();

    assert!(set_control(&dev, &map, "brightness", 40));
    assert!(!set_control(&dev, &map, "brightness", 65));
    assert!(!set_control(&dev, &map, "brightness", i32::MIN));
    assert_eq!(get_control_value(&dev, &map, "brightness").unwrap(), 40);
    assert_eq!(dev.value(BRIGHTNESS), Some(40));
}

#[test]
fn test_read_only_control_rejects_set() {
    let dev = FakeDevice::new("/dev/video0").with_read_only(0x0098_0920, "Sharpness", 3);
    let map = query_controls(&dev).unwrap();
    assert!(!set_control(&dev, &map, "sharpness", 3));
    assert_eq!(get_control_value(&dev, &map, "sharpness").unwrap(), 3);
}

#[test]
fn test_lookup_normalizes_names() {
    let dev = webcam("/dev/video0");
    let map = query_controls(&dev).unwrap();
    assert!(set_control(&dev, &map, "Focus, Absolute", 120));
    assert_eq!(dev.value(FOCUS_ABSOLUTE), Some(120));
}

#[test]
fn test_unknown_control() {
    let dev = webcam("/dev/video0");
    let map = query_controls(&dev).unwrap();
    assert!(!set_control(&dev, &map, "zoom_absolute", 1));
    assert!(matches!(
        get_control_value(&dev, &map, "zoom_absolute"),
        Err(CamError::UnknownControl { .. })
    ));
}

#[test]
fn test_io_error_is_not_end_of_enumeration() {
    let dev = webcam("/dev/video0");
    dev.fail_with(ENODEV);

    let err = query_controls(&dev).unwrap_err();
    assert!(err.is_device_error());
    assert!(get_formats(&dev).unwrap_err().is_device_error());
    assert!(get_capabilities(&dev).unwrap_err().is_device_error());
}

#[test]
fn test_formats_nested_enumeration() {
    let dev = webcam("/dev/video0");
    let formats = get_formats(&dev).unwrap();

    assert_eq!(formats.formats.len(), 2);
    let yuyv = &formats.formats[0];
    assert_eq!(yuyv.label(), "[0]: 'YUYV' (YUYV 4:2:2)");
    assert_eq!(yuyv.sizes.len(), 2);
    assert_eq!(yuyv.sizes[0].label, "Size: Discrete 640x480");
    assert_eq!(
        yuyv.sizes[0].intervals,
        vec![
            "Interval: Discrete 0.033s (30.000 fps)".to_string(),
            "Interval: Discrete 0.067s (15.000 fps)".to_string(),
        ]
    );

    let mjpg = &formats.formats[1];
    assert!(mjpg.is_motion_jpeg());
    assert_eq!(mjpg.label(), "[1]: 'MJPG' (Motion-JPEG, compressed)");
    assert_eq!(mjpg.sizes[1].label, "Size: Discrete 1920x1080");
}

#[test]
fn test_capabilities() {
    let dev = webcam("/dev/video0").with_card("mmal service 16.1");
    let caps = get_capabilities(&dev).unwrap();
    assert_eq!(caps.driver, "fakevideo");
    assert!(caps.card.contains("mmal"));
    assert_eq!(caps.version_string(), "6.1.0");
}

#[test]
fn test_camera_strings() {
    let cam = CameraDevice::v4l2(CameraKind::Uvc, Arc::new(webcam("/dev/video0")), Vec::new()).unwrap();
    assert!(cam.has_hardware_mjpeg_encoder());

    let controls = cam.get_controls_string();
    assert!(controls.starts_with("User Controls:\n"));
    assert!(controls.contains("brightness (int)"));
    assert!(controls.contains("min=-64 max=64 step=1 default=0 value=0"));
    assert!(controls.contains("1: 50 Hz"));
    assert!(controls.contains("\n\nCamera Controls:\n"));

    let formats = cam.get_formats_string();
    assert!(formats.starts_with("[0]: 'YUYV' (YUYV 4:2:2):\n"));
    assert!(formats.contains("        Size: Discrete 1280x720\n"));
    assert!(formats.contains("                Interval: Discrete 0.100s (10.000 fps)"));
}

#[test]
fn test_camera_control_surface() {
    let cam = CameraDevice::v4l2(CameraKind::Uvc, Arc::new(webcam("/dev/video0")), Vec::new()).unwrap();
    assert!(cam.set_control("contrast", 50));
    assert_eq!(cam.get_control_value("contrast").unwrap(), 50);
    assert!(!cam.set_control("contrast", 96));
    assert_eq!(cam.get_control_value("contrast").unwrap(), 50);
}
