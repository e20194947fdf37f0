//! RPC-III time-history codec.
//!
//! An RPC-III file opens with a run of 128-byte header blocks (32 bytes of
//! field name, 96 bytes of value, windows-1251 text), zero-padded to
//! `NUM_HEADER_BLOCKS × 512` bytes, followed by the sample data as
//! little-endian frames demultiplexed into channel groups.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{EngineError, Result};
use crate::numeric::{fnv1a_hash, format_file_size, normalize_int16};

pub const HEADER_BLOCK_SIZE: usize = 128;
pub const HEADER_NAME_SIZE: usize = 32;
pub const HEADER_SECTOR_SIZE: usize = 512;
const BLOCKS_PER_SECTOR: usize = HEADER_SECTOR_SIZE / HEADER_BLOCK_SIZE;

/// Frame length the writer always emits.
pub const WRITE_PTS_PER_FRAME: usize = 1024;

/// A parsed header value. Header text is typed on demand: the mandatory
/// numeric fields are retyped once validated, everything else stays text.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Text(String),
    Int(i64),
    Real(f64),
}

impl HeaderValue {
    pub fn as_text(&self) -> String {
        match self {
            HeaderValue::Text(s) => s.clone(),
            HeaderValue::Int(i) => i.to_string(),
            HeaderValue::Real(r) => r.to_string(),
        }
    }
}

/// Sample storage declared by `DATA_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    FloatingPoint,
    ShortInteger,
}

impl DataType {
    pub fn unit_size(self) -> usize {
        match self {
            DataType::FloatingPoint => 4,
            DataType::ShortInteger => 2,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "FLOATING_POINT" => Some(DataType::FloatingPoint),
            "SHORT_INTEGER" => Some(DataType::ShortInteger),
            _ => None,
        }
    }
}

/// An RPC-III file held in memory, parsed on demand.
///
/// Content errors never panic and never throw: `parse` accumulates
/// diagnostics on `errors` and reports failure through its return value. No
/// partial channel list is exposed on failure.
pub struct RpcFile {
    bytes: Vec<u8>,
    pub file_name: String,
    debug: bool,
    extra_headers: Vec<(String, HeaderValue)>,
    /// Header fields in file order.
    pub headers: Vec<(String, HeaderValue)>,
    index: HashMap<String, usize>,
    pub channels: Vec<Channel>,
    pub errors: Vec<String>,
    hash: String,
    // Geometry derived from the header during parse.
    pub channel_count: usize,
    pub delta_t: f64,
    pub pts_per_frame: usize,
    pub pts_per_group: usize,
    pub frames: usize,
    pub data_type: DataType,
    pub int_full_scale: i64,
    pub frames_per_group: usize,
    pub number_of_groups: usize,
    pub header_blocks: usize,
}

impl RpcFile {
    /// Wraps raw file bytes. `extra_headers` supplies defaults for fields a
    /// producer may have left out; a field present in the file always wins.
    pub fn new(
        bytes: Vec<u8>,
        file_name: &str,
        debug: bool,
        extra_headers: Vec<(String, HeaderValue)>,
    ) -> Self {
        let hash = fnv1a_hash(&bytes);
        RpcFile {
            bytes,
            file_name: file_name.to_owned(),
            debug,
            extra_headers,
            headers: Vec::new(),
            index: HashMap::new(),
            channels: Vec::new(),
            errors: Vec::new(),
            hash,
            channel_count: 0,
            delta_t: 0.0,
            pts_per_frame: 0,
            pts_per_group: 0,
            frames: 0,
            data_type: DataType::ShortInteger,
            int_full_scale: 0,
            frames_per_group: 0,
            number_of_groups: 0,
            header_blocks: 0,
        }
    }

    /// Opaque identifier of the raw bytes.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Human-readable size of the raw bytes.
    pub fn file_size(&self) -> String {
        format_file_size(self.bytes.len() as u64)
    }

    /// Parses the header and decodes all channels.
    ///
    /// Returns `false` when anything is wrong with the content; the
    /// diagnostics land on `errors` and no channels are exposed.
    pub fn parse(&mut self) -> bool {
        self.headers.clear();
        self.index.clear();
        self.channels.clear();
        self.errors.clear();

        self.parse_header();
        if self.errors.is_empty() {
            self.decode_channels();
        }
        if !self.errors.is_empty() {
            self.channels.clear();
            return false;
        }
        true
    }

    fn parse_header(&mut self) {
        // The first three blocks are fixed: FORMAT, NUM_HEADER_BLOCKS,
        // NUM_PARAMS, in that order.
        let fixed = ["FORMAT", "NUM_HEADER_BLOCKS", "NUM_PARAMS"];
        for (i, expected) in fixed.iter().enumerate() {
            let Some((name, value)) = self.read_block(i) else {
                self.errors
                    .push(format!("file too short for header block {}", i + 1));
                return;
            };
            if name != *expected {
                self.errors.push(format!(
                    "header block {} must be {}, found '{}'",
                    i + 1,
                    expected,
                    name
                ));
                return;
            }
            self.insert_header(name, HeaderValue::Text(value));
        }

        let Some(header_blocks) = self.retype_int("NUM_HEADER_BLOCKS") else {
            return;
        };
        let Some(num_params) = self.retype_int("NUM_PARAMS") else {
            return;
        };
        if num_params <= 3 {
            self.errors
                .push(format!("NUM_PARAMS must exceed 3, got {}", num_params));
            return;
        }
        if header_blocks <= 0 {
            self.errors
                .push(format!("NUM_HEADER_BLOCKS must be positive, got {}", header_blocks));
            return;
        }
        self.header_blocks = header_blocks as usize;

        // The remaining parameter blocks carry arbitrary keys; blocks whose
        // name is blank after stripping are skipped.
        for i in 3..num_params as usize {
            let Some((name, value)) = self.read_block(i) else {
                self.errors
                    .push(format!("file too short for header block {}", i + 1));
                return;
            };
            if name.is_empty() {
                continue;
            }
            if self.debug {
                debug!(block = i, name = %name, value = %value, "header block");
            }
            self.insert_header(name, HeaderValue::Text(value));
        }

        // Caller-supplied defaults fill in absent fields only.
        for (key, value) in self.extra_headers.clone() {
            if !self.index.contains_key(&key) {
                self.insert_header(key, value);
            }
        }

        let channels = self.retype_int("CHANNELS");
        let delta_t = self.retype_real("DELTA_T");
        let pts_per_frame = self.retype_int("PTS_PER_FRAME");
        let pts_per_group = self.retype_int("PTS_PER_GROUP");
        let frames = self.retype_int("FRAMES");
        let data_type = match self.text_value("DATA_TYPE") {
            None => {
                self.errors.push("missing header field DATA_TYPE".into());
                None
            }
            Some(text) => match DataType::from_name(&text) {
                Some(dt) => Some(dt),
                None => {
                    self.errors.push(format!(
                        "DATA_TYPE must be FLOATING_POINT or SHORT_INTEGER, got '{}'",
                        text
                    ));
                    None
                }
            },
        };
        if data_type == Some(DataType::ShortInteger) {
            if let Some(full_scale) = self.retype_int("INT_FULL_SCALE") {
                self.int_full_scale = full_scale;
            }
        }
        if !self.errors.is_empty() {
            return;
        }

        let channels = channels.unwrap();
        let pts_per_frame = pts_per_frame.unwrap();
        let pts_per_group = pts_per_group.unwrap();
        let frames = frames.unwrap();
        if channels <= 0 || pts_per_frame <= 0 || pts_per_group <= 0 || frames <= 0 {
            self.errors.push(format!(
                "header geometry must be positive: CHANNELS={}, PTS_PER_FRAME={}, PTS_PER_GROUP={}, FRAMES={}",
                channels, pts_per_frame, pts_per_group, frames
            ));
            return;
        }
        self.channel_count = channels as usize;
        self.delta_t = delta_t.unwrap();
        self.pts_per_frame = pts_per_frame as usize;
        self.pts_per_group = pts_per_group as usize;
        self.frames = frames as usize;
        self.data_type = data_type.unwrap();

        self.frames_per_group = self.pts_per_group / self.pts_per_frame;
        if self.frames_per_group == 0 {
            self.errors.push(format!(
                "PTS_PER_GROUP {} is smaller than PTS_PER_FRAME {}",
                self.pts_per_group, self.pts_per_frame
            ));
            return;
        }
        self.number_of_groups = self.frames.div_ceil(self.frames_per_group);
    }

    fn decode_channels(&mut self) {
        let offset = self.header_blocks * HEADER_SECTOR_SIZE;
        if self.bytes.len() < offset {
            self.errors.push(format!(
                "file shorter than the declared header: {} < {}",
                self.bytes.len(),
                offset
            ));
            return;
        }

        let unit = self.data_type.unit_size();
        let expected = self.pts_per_frame
            * unit
            * self.frames_per_group
            * self.number_of_groups
            * self.channel_count;
        let got = self.bytes.len() - offset;
        if got != expected {
            self.errors.push(
                EngineError::SizeMismatch { expected, got }.to_string(),
            );
            return;
        }

        // Per-channel descriptors; scale applies to short-integer data only.
        let mut scales = Vec::with_capacity(self.channel_count);
        let mut channels = Vec::with_capacity(self.channel_count);
        for i in 1..=self.channel_count {
            let name = self
                .text_value(&format!("DESC.CHAN_{}", i))
                .unwrap_or_else(|| format!("Channel_{}", i));
            let units = self.text_value(&format!("UNITS.CHAN_{}", i)).unwrap_or_default();
            let scale = if self.data_type == DataType::ShortInteger {
                match self.real_value(&format!("SCALE.CHAN_{}", i)) {
                    Some(s) => s,
                    None => {
                        warn!(channel = i, "missing SCALE.CHAN_{}, assuming 1.0", i);
                        1.0
                    }
                }
            } else {
                1.0
            };
            scales.push(scale);
            channels.push(Channel::new(
                i,
                &name,
                &units,
                scale,
                self.delta_t,
                Some(self.file_name.clone()),
                Some(self.hash.clone()),
            ));
        }

        // Demultiplex: each group stores, channel by channel, a contiguous
        // run of frames_per_group frames.
        let samples_per_block = self.frames_per_group * self.pts_per_frame;
        let mut buffers: Vec<Vec<f64>> =
            vec![Vec::with_capacity(samples_per_block * self.number_of_groups); self.channel_count];
        let mut pos = offset;
        for _ in 0..self.number_of_groups {
            for (c, buffer) in buffers.iter_mut().enumerate() {
                match self.data_type {
                    DataType::FloatingPoint => {
                        for _ in 0..samples_per_block {
                            let raw =
                                f32::from_le_bytes(self.bytes[pos..pos + 4].try_into().unwrap());
                            buffer.push(raw as f64);
                            pos += 4;
                        }
                    }
                    DataType::ShortInteger => {
                        let scale = scales[c];
                        for _ in 0..samples_per_block {
                            let raw =
                                i16::from_le_bytes(self.bytes[pos..pos + 2].try_into().unwrap());
                            buffer.push(raw as f64 * scale);
                            pos += 2;
                        }
                    }
                }
            }
        }

        // Trailing group padding beyond FRAMES × PTS_PER_FRAME is dropped.
        let nominal = self.frames * self.pts_per_frame;
        for (channel, mut buffer) in channels.iter_mut().zip(buffers) {
            buffer.truncate(nominal);
            channel.set_samples(buffer);
            channel.set_min_max();
        }
        self.channels = channels;
    }

    fn read_block(&self, index: usize) -> Option<(String, String)> {
        let start = index * HEADER_BLOCK_SIZE;
        let end = start + HEADER_BLOCK_SIZE;
        if self.bytes.len() < end {
            return None;
        }
        let name = clean_header_text(&decode_cp1251(&self.bytes[start..start + HEADER_NAME_SIZE]))
            .trim()
            .to_owned();
        let value = clean_header_text(&decode_cp1251(
            &self.bytes[start + HEADER_NAME_SIZE..end],
        ));
        Some((name, value))
    }

    fn insert_header(&mut self, key: String, value: HeaderValue) {
        self.index.insert(key.clone(), self.headers.len());
        self.headers.push((key, value));
    }

    fn text_value(&self, key: &str) -> Option<String> {
        self.index
            .get(key)
            .map(|&i| self.headers[i].1.as_text().trim().to_owned())
    }

    fn real_value(&self, key: &str) -> Option<f64> {
        self.text_value(key).and_then(|t| t.parse().ok())
    }

    /// Parses a mandatory integer field, retypes it in the header list, and
    /// records an error when it is absent or non-numeric.
    fn retype_int(&mut self, key: &str) -> Option<i64> {
        match self.index.get(key) {
            None => {
                self.errors.push(format!("missing header field {}", key));
                None
            }
            Some(&i) => match self.headers[i].1.as_text().trim().parse::<i64>() {
                Ok(v) => {
                    self.headers[i].1 = HeaderValue::Int(v);
                    Some(v)
                }
                Err(_) => {
                    self.errors.push(format!(
                        "header field {} is not an integer: '{}'",
                        key,
                        self.headers[i].1.as_text()
                    ));
                    None
                }
            },
        }
    }

    fn retype_real(&mut self, key: &str) -> Option<f64> {
        match self.index.get(key) {
            None => {
                self.errors.push(format!("missing header field {}", key));
                None
            }
            Some(&i) => match self.headers[i].1.as_text().trim().parse::<f64>() {
                Ok(v) => {
                    self.headers[i].1 = HeaderValue::Real(v);
                    Some(v)
                }
                Err(_) => {
                    self.errors.push(format!(
                        "header field {} is not a number: '{}'",
                        key,
                        self.headers[i].1.as_text()
                    ));
                    None
                }
            },
        }
    }

    /// Encodes channels into a short-integer RPC-III file.
    ///
    /// Every channel is normalized to the signed 16-bit domain with its own
    /// scale factor; channels shorter than the group length are right-padded
    /// with their last sample.
    pub fn write(channels: &[Channel]) -> Result<Vec<u8>> {
        if channels.is_empty() {
            return Err(EngineError::MalformedHeader(
                "cannot write a file without channels".into(),
            ));
        }
        let max_len = channels.iter().map(|c| c.samples().len()).max().unwrap();
        let frames = max_len.div_ceil(WRITE_PTS_PER_FRAME).max(1);
        let pts_per_group = frames * WRITE_PTS_PER_FRAME;
        let delta_t = channels[0].dt;

        let mut quantized = Vec::with_capacity(channels.len());
        let mut factors = Vec::with_capacity(channels.len());
        for channel in channels {
            let (q, factor) = normalize_int16(channel.samples());
            quantized.push(q);
            factors.push(factor);
        }

        let mut fields: Vec<(String, String)> = vec![
            ("FORMAT".into(), "BINARY".into()),
            ("NUM_HEADER_BLOCKS".into(), String::new()),
            ("NUM_PARAMS".into(), String::new()),
            ("FILE_TYPE".into(), "TIME_HISTORY".into()),
            ("TIME_TYPE".into(), "RESPONSE".into()),
            ("DELTA_T".into(), format!("{}", delta_t)),
            ("CHANNELS".into(), channels.len().to_string()),
            (
                "DATE".into(),
                chrono::Local::now().format("%H:%M:%S %d-%m-%Y").to_string(),
            ),
            ("REPEATS".into(), "1".into()),
            ("DATA_TYPE".into(), "SHORT_INTEGER".into()),
            ("PTS_PER_FRAME".into(), WRITE_PTS_PER_FRAME.to_string()),
            ("PTS_PER_GROUP".into(), pts_per_group.to_string()),
            ("FRAMES".into(), frames.to_string()),
        ];
        for (i, channel) in channels.iter().enumerate() {
            let n = i + 1;
            fields.push((format!("DESC.CHAN_{}", n), channel.name.clone()));
            fields.push((format!("UNITS.CHAN_{}", n), channel.units.clone()));
            fields.push((format!("SCALE.CHAN_{}", n), format!("{:.6e}", factors[i])));
            fields.push((format!("LOWER_LIMIT.CHAN_{}", n), "1".into()));
            fields.push((format!("UPPER_LIMIT.CHAN_{}", n), "-1".into()));
        }

        let num_params = fields.len();
        let header_blocks = num_params.div_ceil(BLOCKS_PER_SECTOR);
        fields[1].1 = header_blocks.to_string();
        fields[2].1 = num_params.to_string();

        let header_size = header_blocks * HEADER_SECTOR_SIZE;
        let data_size = pts_per_group * 2 * channels.len();
        let mut out = vec![0u8; header_size + data_size];
        for (i, (name, value)) in fields.iter().enumerate() {
            let start = i * HEADER_BLOCK_SIZE;
            write_padded(&mut out[start..start + HEADER_NAME_SIZE], name);
            write_padded(
                &mut out[start + HEADER_NAME_SIZE..start + HEADER_BLOCK_SIZE],
                value,
            );
        }

        // One group holding all frames: channel after channel, padded out to
        // the group length with the channel's own last sample.
        let mut pos = header_size;
        for q in &quantized {
            let pad = q.last().copied().unwrap_or(0);
            for i in 0..pts_per_group {
                let sample = q.get(i).copied().unwrap_or(pad);
                out[pos..pos + 2].copy_from_slice(&sample.to_le_bytes());
                pos += 2;
            }
        }
        Ok(out)
    }
}

fn write_padded(target: &mut [u8], text: &str) {
    let encoded = encode_cp1251(text);
    let n = encoded.len().min(target.len());
    target[..n].copy_from_slice(&encoded[..n]);
}

fn clean_header_text(text: &str) -> String {
    text.chars()
        .filter(|&c| c != '\0' && c != '\n' && c != '\r')
        .collect()
}

// Windows-1251 high half, 0x80..=0xFF. The low half is ASCII.
const CP1251_HIGH: [char; 128] = [
    'Ђ', 'Ѓ', '‚', 'ѓ', '„', '…', '†', '‡', '€', '‰', 'Љ', '‹', 'Њ', 'Ќ', 'Ћ', 'Џ', //
    'ђ', '‘', '’', '“', '”', '•', '–', '—', '\u{98}', '™', 'љ', '›', 'њ', 'ќ', 'ћ', 'џ', //
    '\u{a0}', 'Ў', 'ў', 'Ј', '¤', 'Ґ', '¦', '§', 'Ё', '©', 'Є', '«', '¬', '\u{ad}', '®', 'Ї', //
    '°', '±', 'І', 'і', 'ґ', 'µ', '¶', '·', 'ё', '№', 'є', '»', 'ј', 'Ѕ', 'ѕ', 'ї', //
    'А', 'Б', 'В', 'Г', 'Д', 'Е', 'Ж', 'З', 'И', 'Й', 'К', 'Л', 'М', 'Н', 'О', 'П', //
    'Р', 'С', 'Т', 'У', 'Ф', 'Х', 'Ц', 'Ч', 'Ш', 'Щ', 'Ъ', 'Ы', 'Ь', 'Э', 'Ю', 'Я', //
    'а', 'б', 'в', 'г', 'д', 'е', 'ж', 'з', 'и', 'й', 'к', 'л', 'м', 'н', 'о', 'п', //
    'р', 'с', 'т', 'у', 'ф', 'х', 'ц', 'ч', 'ш', 'щ', 'ъ', 'ы', 'ь', 'э', 'ю', 'я',
];

fn decode_cp1251(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                b as char
            } else {
                CP1251_HIGH[(b - 0x80) as usize]
            }
        })
        .collect()
}

fn encode_cp1251(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| {
            if (c as u32) < 0x80 {
                c as u8
            } else {
                CP1251_HIGH
                    .iter()
                    .position(|&h| h == c)
                    .map(|i| (i + 0x80) as u8)
                    .unwrap_or(b'?')
            }
        })
        .collect()
}
