//! Best-effort persistent cache for linked program binaries.
//!
//! Linking a program from source can take tens of milliseconds; most drivers
//! can export the linked result as an opaque binary and accept it back on a
//! later run. This module keys those binaries by program content identity plus
//! specialization constants and stores them through a platform-supplied blob
//! store. Nothing here is required for correctness: every failure path
//! degrades to compiling from source, and a binary that the driver accepts but
//! cannot actually use (typically after a driver update) is detected by a
//! post-load validation step and discarded.

use std::num::NonZeroU32;

use tracing::{debug, warn};

use crate::pipeline_key::{SpecConstant, SpecConstantValue};
use crate::stats::ProgramBinaryCacheStats;

/// First retrieval attempt always uses this buffer size; large enough for the
/// common case so a second platform call is rare.
pub const DEFAULT_BLOB_SIZE: usize = 64 * 1024;

/// Serialized blobs carry a little-endian `u32` binary-format tag ahead of the
/// driver payload.
const BLOB_HEADER_SIZE: usize = 4;

/// Owned handle to a linked driver program. The driver's `0` sentinel is
/// unrepresentable; "no program" is `Option::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(NonZeroU32);

impl ProgramHandle {
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Platform-supplied persistent key/value store. Keys and values are opaque
/// byte buffers; the platform owns their on-disk layout and lifetime.
pub trait BlobPlatform {
    fn has_retrieve_blob(&self) -> bool;
    fn has_insert_blob(&self) -> bool;
    /// Copy up to `out.len()` bytes of the value stored under `key` into
    /// `out` and return the value's full size. Zero means absent.
    fn retrieve_blob(&self, key: &[u8], out: &mut [u8]) -> usize;
    fn insert_blob(&self, key: &[u8], value: &[u8]);
}

/// Driver operations the binary cache consumes.
pub trait ProgramBinaryDriver {
    /// Number of binary formats the driver can export/import. Zero disables
    /// the cache entirely.
    fn num_program_binary_formats(&self) -> u32;
    fn create_program(&mut self) -> ProgramHandle;
    /// Feed a previously exported binary into `program`.
    fn load_binary(&mut self, program: ProgramHandle, format: u32, payload: &[u8]);
    /// Pop the oldest pending driver error, if any.
    fn take_error(&mut self) -> Option<u32>;
    /// Whether `program` reached the linked, ready-to-use state.
    fn is_linked(&self, program: ProgramHandle) -> bool;
    fn delete_program(&mut self, program: ProgramHandle);
    /// Size in bytes of `program`'s exported binary; zero when the driver has
    /// nothing to export.
    fn binary_len(&self, program: ProgramHandle) -> usize;
    /// Write `program`'s binary into `out` and return its format tag.
    fn read_binary(&mut self, program: ProgramHandle, out: &mut [u8]) -> u32;
}

/// Cache key: stable program content identity plus the specialization
/// constants the program was compiled with, serialized deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProgramCacheKey {
    bytes: Vec<u8>,
}

impl ProgramCacheKey {
    pub fn new(cache_id: u64, constants: &[SpecConstant]) -> Self {
        let mut bytes = Vec::with_capacity(8 + constants.len() * 16);
        bytes.extend_from_slice(&cache_id.to_le_bytes());
        for constant in constants {
            bytes.extend_from_slice(&(constant.name.len() as u32).to_le_bytes());
            bytes.extend_from_slice(constant.name.as_bytes());
            match constant.value {
                SpecConstantValue::Int(v) => {
                    bytes.push(0);
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                SpecConstantValue::Float(v) => {
                    bytes.push(1);
                    bytes.extend_from_slice(&v.to_bits().to_le_bytes());
                }
                SpecConstantValue::Bool(v) => {
                    bytes.push(2);
                    bytes.push(v as u8);
                }
            }
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A retrieved or to-be-inserted program binary: format tag plus opaque
/// driver payload. Only the driver that produced the payload can interpret
/// it, and only the same driver version is expected to accept it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramBlob {
    format: u32,
    payload: Vec<u8>,
}

impl ProgramBlob {
    pub fn from_parts(format: u32, payload: Vec<u8>) -> Self {
        Self { format, payload }
    }

    /// Split a stored buffer into header and payload. Buffers too small to
    /// carry a header cannot have been produced by [`ProgramBlob::encode`].
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < BLOB_HEADER_SIZE {
            return None;
        }
        let mut tag = [0u8; BLOB_HEADER_SIZE];
        tag.copy_from_slice(&bytes[..BLOB_HEADER_SIZE]);
        Some(Self {
            format: u32::from_le_bytes(tag),
            payload: bytes[BLOB_HEADER_SIZE..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BLOB_HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.format.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn format(&self) -> u32 {
        self.format
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total serialized size, header included.
    pub fn size(&self) -> usize {
        BLOB_HEADER_SIZE + self.payload.len()
    }
}

/// Cross-process program binary cache.
///
/// Caching is unsupported, and every operation a silent no-op, unless the
/// driver exports at least one binary format and the platform provides the
/// corresponding store function.
pub struct ProgramBinaryCache {
    caching_supported: bool,
    hits: u64,
    misses: u64,
    inserts: u64,
    stale_binaries: u64,
}

impl ProgramBinaryCache {
    pub fn new(driver: &impl ProgramBinaryDriver) -> Self {
        Self {
            caching_supported: driver.num_program_binary_formats() >= 1,
            hits: 0,
            misses: 0,
            inserts: 0,
            stale_binaries: 0,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.caching_supported
    }

    /// Fetch the blob stored under `key`, probing with a
    /// [`DEFAULT_BLOB_SIZE`] buffer and retrying at most once with the exact
    /// platform-reported size. A reported size of zero is an absence, not an
    /// error.
    pub fn retrieve(
        &mut self,
        platform: &impl BlobPlatform,
        key: &ProgramCacheKey,
    ) -> Option<ProgramBlob> {
        if !self.caching_supported || !platform.has_retrieve_blob() {
            return None;
        }

        let mut buf = vec![0u8; DEFAULT_BLOB_SIZE];
        let size = platform.retrieve_blob(key.as_bytes(), &mut buf);
        if size == 0 {
            self.misses += 1;
            return None;
        }
        if size > buf.len() {
            // Our buffer was too small; the platform reported the true size,
            // so one resized attempt settles it.
            buf = vec![0u8; size];
            let resized = platform.retrieve_blob(key.as_bytes(), &mut buf);
            if resized != size {
                debug!(expected = size, reported = resized, "blob size changed between retrievals");
                self.misses += 1;
                return None;
            }
        } else {
            buf.truncate(size);
        }

        match ProgramBlob::decode(&buf) {
            Some(blob) => {
                self.hits += 1;
                Some(blob)
            }
            None => {
                debug!(size, "stored blob too small to carry a header");
                self.misses += 1;
                None
            }
        }
    }

    /// Instantiate a driver program from a retrieved blob.
    ///
    /// The load call can succeed at the driver level yet still yield an
    /// unlinked program (typically when a driver update has invalidated
    /// previously saved binaries), so two independent signals are checked: no
    /// pending driver error, and the program reports linked. On either
    /// failure the partially-created program is destroyed and `None` tells
    /// the caller to fall back to a full source compilation.
    pub fn create_program(
        &mut self,
        driver: &mut impl ProgramBinaryDriver,
        name: &str,
        blob: &ProgramBlob,
    ) -> Option<ProgramHandle> {
        let program = driver.create_program();
        driver.load_binary(program, blob.format(), blob.payload());

        let driver_error = driver.take_error();
        let linked = driver_error.is_none() && driver.is_linked(program);
        if driver_error.is_some() || !linked {
            warn!(
                name,
                size = blob.size(),
                format = blob.format(),
                ?driver_error,
                linked,
                "failed to load program binary; falling back to source compilation"
            );
            driver.delete_program(program);
            self.stale_binaries += 1;
            return None;
        }
        Some(program)
    }

    /// Export `program`'s binary and hand it to the platform store under
    /// `key`. Insertion is a pure optimization: any driver error while
    /// querying or extracting the binary drops the insert silently.
    pub fn insert(
        &mut self,
        platform: &impl BlobPlatform,
        driver: &mut impl ProgramBinaryDriver,
        key: &ProgramCacheKey,
        program: ProgramHandle,
    ) {
        if !self.caching_supported || !platform.has_insert_blob() {
            return;
        }

        let payload_len = driver.binary_len(program);
        if payload_len == 0 {
            return;
        }
        let mut payload = vec![0u8; payload_len];
        let format = driver.read_binary(program, &mut payload);
        if driver.take_error().is_some() {
            return;
        }

        let blob = ProgramBlob::from_parts(format, payload);
        platform.insert_blob(key.as_bytes(), &blob.encode());
        self.inserts += 1;
    }

    pub fn stats(&self) -> ProgramBinaryCacheStats {
        ProgramBinaryCacheStats {
            hits: self.hits,
            misses: self.misses,
            inserts: self.inserts,
            stale_binaries: self.stale_binaries,
            disabled: !self.caching_supported,
        }
    }
}
