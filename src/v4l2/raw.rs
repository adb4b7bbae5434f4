//! Kernel ABI bindings
//!
//! `#[repr(C)]` mirrors of the `videodev2.h` structs used for control and
//! format introspection, and the [`V4l2Device`] seam that issues the calls.
//! Request numbers come from `v4l::v4l2::vidioc`.
//!
//! Only the structs this crate needs are defined. The tests check that each
//! mirror has the size encoded in its request number, so the kernel never
//! writes past one.

#![allow(non_camel_case_types)]

use std::ffi::c_void;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use v4l::v4l2::vidioc::{self, _IOC_TYPE};

// Control types
pub const V4L2_CTRL_TYPE_INTEGER: u32 = 1;
pub const V4L2_CTRL_TYPE_BOOLEAN: u32 = 2;
pub const V4L2_CTRL_TYPE_MENU: u32 = 3;
pub const V4L2_CTRL_TYPE_BUTTON: u32 = 4;
pub const V4L2_CTRL_TYPE_INTEGER64: u32 = 5;
pub const V4L2_CTRL_TYPE_CTRL_CLASS: u32 = 6;
pub const V4L2_CTRL_TYPE_STRING: u32 = 7;
pub const V4L2_CTRL_TYPE_BITMASK: u32 = 8;
pub const V4L2_CTRL_TYPE_INTEGER_MENU: u32 = 9;

// Control flags
pub const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;
pub const V4L2_CTRL_FLAG_GRABBED: u32 = 0x0002;
pub const V4L2_CTRL_FLAG_READ_ONLY: u32 = 0x0004;
pub const V4L2_CTRL_FLAG_UPDATE: u32 = 0x0008;
pub const V4L2_CTRL_FLAG_INACTIVE: u32 = 0x0010;
pub const V4L2_CTRL_FLAG_SLIDER: u32 = 0x0020;
pub const V4L2_CTRL_FLAG_WRITE_ONLY: u32 = 0x0040;
pub const V4L2_CTRL_FLAG_VOLATILE: u32 = 0x0080;
pub const V4L2_CTRL_FLAG_HAS_PAYLOAD: u32 = 0x0100;
pub const V4L2_CTRL_FLAG_EXECUTE_ON_WRITE: u32 = 0x0200;
pub const V4L2_CTRL_FLAG_MODIFY_LAYOUT: u32 = 0x0400;
pub const V4L2_CTRL_FLAG_DYNAMIC_ARRAY: u32 = 0x0800;

// Query flags, OR'd into the control id
pub const V4L2_CTRL_FLAG_NEXT_CTRL: u32 = 0x8000_0000;
pub const V4L2_CTRL_FLAG_NEXT_COMPOUND: u32 = 0x4000_0000;

pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;

// Format description flags
pub const V4L2_FMT_FLAG_COMPRESSED: u32 = 0x0001;
pub const V4L2_FMT_FLAG_EMULATED: u32 = 0x0002;
pub const V4L2_FMT_FLAG_CONTINUOUS_BYTESTREAM: u32 = 0x0004;
pub const V4L2_FMT_FLAG_DYN_RESOLUTION: u32 = 0x0008;
pub const V4L2_FMT_FLAG_ENC_CAP_FRAME_INTERVAL: u32 = 0x0010;
pub const V4L2_FMT_FLAG_CSC_COLORSPACE: u32 = 0x0020;
pub const V4L2_FMT_FLAG_CSC_XFER_FUNC: u32 = 0x0040;
pub const V4L2_FMT_FLAG_CSC_YCBCR_ENC: u32 = 0x0080;
pub const V4L2_FMT_FLAG_CSC_QUANTIZATION: u32 = 0x0100;

pub const V4L2_FRMSIZE_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMSIZE_TYPE_CONTINUOUS: u32 = 2;
pub const V4L2_FRMSIZE_TYPE_STEPWISE: u32 = 3;

pub const V4L2_FRMIVAL_TYPE_DISCRETE: u32 = 1;
pub const V4L2_FRMIVAL_TYPE_CONTINUOUS: u32 = 2;
pub const V4L2_FRMIVAL_TYPE_STEPWISE: u32 = 3;

/// `struct v4l2_capability`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_query_ext_ctrl`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_query_ext_ctrl {
    pub id: u32,
    pub type_: u32,
    pub name: [u8; 32],
    pub minimum: i64,
    pub maximum: i64,
    pub step: u64,
    pub default_value: i64,
    pub flags: u32,
    pub elem_size: u32,
    pub elems: u32,
    pub nr_of_dims: u32,
    pub dims: [u32; 4],
    pub reserved: [u32; 32],
}

/// `struct v4l2_querymenu`
///
/// The kernel struct is packed and carries a `name`/`value` union; the
/// union is kept as raw bytes and decoded by [`v4l2_querymenu::name`] and
/// [`v4l2_querymenu::value`].
#[repr(C, packed)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_querymenu {
    pub id: u32,
    pub index: u32,
    pub union: [u8; 32],
    pub reserved: u32,
}

impl v4l2_querymenu {
    /// Menu label, for `V4L2_CTRL_TYPE_MENU`
    pub fn name(&self) -> String {
        let bytes = self.union;
        cstr_to_string(&bytes)
    }

    /// Menu value, for `V4L2_CTRL_TYPE_INTEGER_MENU`
    pub fn value(&self) -> i64 {
        let bytes = self.union;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        i64::from_ne_bytes(raw)
    }

    pub fn set_value(&mut self, value: i64) {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&value.to_ne_bytes());
        self.union = bytes;
    }
}

/// `struct v4l2_control`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_control {
    pub id: u32,
    pub value: i32,
}

/// `struct v4l2_fmtdesc`
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_fmtdesc {
    pub index: u32,
    pub type_: u32,
    pub flags: u32,
    pub description: [u8; 32],
    pub pixelformat: u32,
    pub mbus_code: u32,
    pub reserved: [u32; 3],
}

/// `struct v4l2_frmsizeenum`
///
/// `union` holds either `v4l2_frmsize_discrete { width, height }` in the
/// first two words or `v4l2_frmsize_stepwise { min_width, max_width,
/// step_width, min_height, max_height, step_height }`.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_frmsizeenum {
    pub index: u32,
    pub pixel_format: u32,
    pub type_: u32,
    pub union: [u32; 6],
    pub reserved: [u32; 2],
}

/// `struct v4l2_frmivalenum`
///
/// `union` holds either a discrete `v4l2_fract { numerator, denominator }`
/// or `v4l2_frmival_stepwise { min, max, step }` as three fractions.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct v4l2_frmivalenum {
    pub index: u32,
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub type_: u32,
    pub union: [u32; 6],
    pub reserved: [u32; 2],
}

/// Decode a NUL-terminated byte field
pub fn cstr_to_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy `value` into a fixed-size byte field, truncating and NUL-terminating
pub fn copy_cstr(dst: &mut [u8], value: &str) {
    dst.fill(0);
    let len = value.len().min(dst.len().saturating_sub(1));
    dst[..len].copy_from_slice(&value.as_bytes()[..len]);
}

/// A V4L2 device node as seen by the introspection engine
///
/// Each method is one ioctl: the argument struct is filled in by the caller
/// and completed by the driver. Errors are returned untouched so the engine
/// can tell end-of-enumeration (`EINVAL`) from a real device failure.
pub trait V4l2Device: Send + Sync {
    /// Node this handle talks to
    fn path(&self) -> &Path;

    fn query_cap(&self, cap: &mut v4l2_capability) -> io::Result<()>;

    fn query_ext_ctrl(&self, query: &mut v4l2_query_ext_ctrl) -> io::Result<()>;

    fn query_menu(&self, menu: &mut v4l2_querymenu) -> io::Result<()>;

    fn get_ctrl(&self, ctrl: &mut v4l2_control) -> io::Result<()>;

    fn set_ctrl(&self, ctrl: &mut v4l2_control) -> io::Result<()>;

    fn enum_fmt(&self, fmt: &mut v4l2_fmtdesc) -> io::Result<()>;

    fn enum_framesizes(&self, size: &mut v4l2_frmsizeenum) -> io::Result<()>;

    fn enum_frameintervals(&self, ival: &mut v4l2_frmivalenum) -> io::Result<()>;
}

/// Real device node, opened read-write for the duration of each call
///
/// Opening per call means a device that disappears and comes back under
/// the same node keeps working, and a vanished device surfaces as an
/// `ENOENT`/`ENODEV` error on the next call.
#[derive(Debug, Clone)]
pub struct KernelDevice {
    path: PathBuf,
}

impl KernelDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn ioctl<T>(&self, request: _IOC_TYPE, arg: &mut T) -> io::Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        // SAFETY: `arg` is one of the #[repr(C)] structs above and `request`
        // encodes exactly its size, so the kernel never writes past it.
        unsafe { v4l::v4l2::ioctl(file.as_raw_fd(), request, arg as *mut T as *mut c_void) }
    }
}

impl V4l2Device for KernelDevice {
    fn path(&self) -> &Path {
        &self.path
    }

    fn query_cap(&self, cap: &mut v4l2_capability) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_QUERYCAP, cap)
    }

    fn query_ext_ctrl(&self, query: &mut v4l2_query_ext_ctrl) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_QUERY_EXT_CTRL, query)
    }

    fn query_menu(&self, menu: &mut v4l2_querymenu) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_QUERYMENU, menu)
    }

    fn get_ctrl(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_G_CTRL, ctrl)
    }

    fn set_ctrl(&self, ctrl: &mut v4l2_control) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_S_CTRL, ctrl)
    }

    fn enum_fmt(&self, fmt: &mut v4l2_fmtdesc) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_ENUM_FMT, fmt)
    }

    fn enum_framesizes(&self, size: &mut v4l2_frmsizeenum) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_ENUM_FRAMESIZES, size)
    }

    fn enum_frameintervals(&self, ival: &mut v4l2_frmivalenum) -> io::Result<()> {
        self.ioctl(vidioc::VIDIOC_ENUM_FRAMEINTERVALS, ival)
    }
}
