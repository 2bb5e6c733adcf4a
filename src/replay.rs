// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! A [`MarkerTracker`] that plays back recorded marker transforms.
//!
//! Useful for running the whole pipeline without a camera, in tests and demos.
//!
//! Recording format (all little-endian):
//! ```text
//! "ARRP" | version: u32 | projection: [f32; 16] | frame count: u32
//! per frame:  entry count: u32
//! per entry:  name length: u16 | marker config string (UTF-8) | transform: [f32; 16]
//! ```
//! A marker is visible in a frame if and only if the frame has an entry for it.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info};

use crate::{Error, MarkerTracker, Result};

const MAGIC: &[u8; 4] = b"ARRP";
const VERSION: u32 = 1;

/// Transforms of the markers seen in a single camera frame, keyed by marker config string
pub type ReplayFrame = HashMap<String, [f32; 16]>;

/// Value of a marker option that was set on the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerOptionValue {
    /// From `set_marker_option_int`
    Int(i32),
    /// From `set_marker_option_float`
    Float(f32),
    /// From `set_marker_option_bool`
    Bool(bool),
}

/// Plays back a list of frames. Before the first [`MarkerTracker::next_frame`]
/// and after the last frame (unless looping) no marker is visible.
#[derive(Debug, Clone)]
pub struct ReplayTracker {
    projection: [f32; 16],
    frames: Vec<ReplayFrame>,
    position: Option<usize>,
    looping: bool,
    markers: Vec<String>,
    pattern_detection_mode: Option<i32>,
    matrix_code_type: Option<i32>,
    marker_options: Vec<(i32, i32, MarkerOptionValue)>,
}

impl ReplayTracker {
    /// Create a tracker from in-memory frames
    pub fn from_frames(projection: [f32; 16], frames: Vec<ReplayFrame>) -> Self {
        Self {
            projection,
            frames,
            position: None,
            looping: false,
            markers: Vec::new(),
            pattern_detection_mode: None,
            matrix_code_type: None,
            marker_options: Vec::new(),
        }
    }

    /// Open a recording file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let tracker = Self::read_from(BufReader::new(File::open(path)?))?;
        info!(
            "Loaded replay {} with {} frames",
            path.display(),
            tracker.frames.len()
        );
        Ok(tracker)
    }

    /// Parse a recording
    pub fn read_from(mut reader: impl Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Other("Not a marker replay recording"));
        }
        if reader.read_u32::<LittleEndian>()? != VERSION {
            return Err(Error::Other("Unsupported marker replay version"));
        }
        let projection = read_matrix(&mut reader)?;
        let frame_count = reader.read_u32::<LittleEndian>()?;
        let mut frames = Vec::new();
        for _ in 0..frame_count {
            let entry_count = reader.read_u32::<LittleEndian>()?;
            let mut frame = ReplayFrame::new();
            for _ in 0..entry_count {
                let name_len = reader.read_u16::<LittleEndian>()?;
                let mut name = vec![0u8; name_len as usize];
                reader.read_exact(&mut name)?;
                let name = String::from_utf8(name)
                    .map_err(|_| Error::Other("Marker name in replay is not UTF-8"))?;
                frame.insert(name, read_matrix(&mut reader)?);
            }
            frames.push(frame);
        }
        Ok(Self::from_frames(projection, frames))
    }

    /// Serialize the frames in the recording format
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        write_matrix(&mut writer, &self.projection)?;
        writer.write_u32::<LittleEndian>(self.frames.len() as u32)?;
        for frame in &self.frames {
            writer.write_u32::<LittleEndian>(frame.len() as u32)?;
            // Sorted, so that the same frames always produce the same bytes
            let mut entries: Vec<_> = frame.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            for (name, transform) in entries {
                let name_len = u16::try_from(name.len())
                    .map_err(|_| Error::Other("Marker name too long for replay"))?;
                writer.write_u16::<LittleEndian>(name_len)?;
                writer.write_all(name.as_bytes())?;
                write_matrix(&mut writer, transform)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Save to a recording file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    /// Append a frame to the end of the recording
    pub fn push_frame(&mut self, frame: ReplayFrame) {
        self.frames.push(frame);
    }

    /// Restart from the first frame after the last one, instead of going blank
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// All frames of the recording
    pub fn frames(&self) -> &[ReplayFrame] {
        &self.frames
    }

    /// Index of the frame being played, `None` before the first frame
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// `true` once a non-looping replay ran past its last frame
    pub fn is_exhausted(&self) -> bool {
        self.position.map_or(false, |p| p >= self.frames.len())
    }

    /// Marker config strings registered so far, indexed by handle
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Last pattern detection mode set
    pub fn pattern_detection_mode(&self) -> Option<i32> {
        self.pattern_detection_mode
    }

    /// Last matrix code type set
    pub fn matrix_code_type(&self) -> Option<i32> {
        self.matrix_code_type
    }

    /// Every marker option set, as (handle, option, value), in order
    pub fn marker_options(&self) -> &[(i32, i32, MarkerOptionValue)] {
        &self.marker_options
    }

    fn current_entry(&self, handle: i32) -> Option<&[f32; 16]> {
        let frame = self.frames.get(self.position?)?;
        let marker = self.markers.get(usize::try_from(handle).ok()?)?;
        frame.get(marker)
    }

    fn check_handle(&self, handle: i32) -> Result<()> {
        match usize::try_from(handle) {
            Ok(index) if index < self.markers.len() => Ok(()),
            _ => Err(Error::Other("Unknown marker handle")),
        }
    }
}

impl MarkerTracker for ReplayTracker {
    fn add_marker(&mut self, config: &str) -> Result<i32> {
        if config.trim().is_empty() {
            return Err(Error::MarkerRegistration("(empty config)".into()));
        }
        self.markers.push(config.to_owned());
        let handle = (self.markers.len() - 1) as i32;
        debug!("Registered replay marker {} as {}", config, handle);
        Ok(handle)
    }

    fn next_frame(&mut self) {
        let next = self.position.map_or(0, |p| p.saturating_add(1));
        self.position = Some(if self.looping && next >= self.frames.len() {
            0
        } else {
            next.min(self.frames.len())
        });
    }

    fn query_marker_visible(&mut self, handle: i32) -> bool {
        self.current_entry(handle).is_some()
    }

    fn query_marker_transformation(&mut self, handle: i32) -> Option<[f32; 16]> {
        self.current_entry(handle).copied()
    }

    fn projection_matrix(&self) -> [f32; 16] {
        self.projection
    }

    fn set_marker_option_int(&mut self, handle: i32, option: i32, value: i32) -> Result<()> {
        self.check_handle(handle)?;
        self.marker_options
            .push((handle, option, MarkerOptionValue::Int(value)));
        Ok(())
    }

    fn set_marker_option_float(&mut self, handle: i32, option: i32, value: f32) -> Result<()> {
        self.check_handle(handle)?;
        self.marker_options
            .push((handle, option, MarkerOptionValue::Float(value)));
        Ok(())
    }

    fn set_marker_option_bool(&mut self, handle: i32, option: i32, value: bool) -> Result<()> {
        self.check_handle(handle)?;
        self.marker_options
            .push((handle, option, MarkerOptionValue::Bool(value)));
        Ok(())
    }

    fn set_pattern_detection_mode(&mut self, mode: i32) -> Result<()> {
        self.pattern_detection_mode = Some(mode);
        Ok(())
    }

    fn set_matrix_code_type(&mut self, code_type: i32) -> Result<()> {
        self.matrix_code_type = Some(code_type);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Replay"
    }
}

fn read_matrix(reader: &mut impl Read) -> Result<[f32; 16]> {
    let mut result = [0.0; 16];
    reader.read_f32_into::<LittleEndian>(&mut result)?;
    Ok(result)
}

fn write_matrix(writer: &mut impl Write, matrix: &[f32; 16]) -> Result<()> {
    for value in matrix {
        writer.write_f32::<LittleEndian>(*value)?;
    }
    Ok(())
}
