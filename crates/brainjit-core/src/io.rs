// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! State persistence
//!
//! A state file holds a flat mapping from dotted variable path to array.
//! Codecs are picked by file extension from a [`CodecRegistry`]; JSON and
//! bincode ship by default and further formats are added by registration.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::{BrainJitError, Result};
use crate::value::StateMap;

/// A file format for state maps
pub trait StateCodec {
    fn name(&self) -> &str;

    /// Extensions handled, lowercase and without the dot
    fn extensions(&self) -> &[&'static str];

    fn save(&self, path: &Path, state: &StateMap) -> Result<()>;

    fn load(&self, path: &Path) -> Result<StateMap>;
}

/// Human-readable JSON (`.json`)
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl StateCodec for JsonCodec {
    fn name(&self) -> &str {
        "json"
    }

    fn extensions(&self) -> &[&'static str] {
        &["json"]
    }

    /// # Errors
    ///
    /// `Codec` if any value is NaN or infinite; JSON has no encoding for
    /// them. Nothing is written in that case.
    fn save(&self, path: &Path, state: &StateMap) -> Result<()> {
        if let Some((key, _)) = state.iter().find(|(_, a)| a.iter().any(|x| !x.is_finite())) {
            return Err(BrainJitError::Codec(format!(
                "json: '{}' holds a non-finite value; use the bincode format",
                key
            )));
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<StateMap> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Compact binary (`.bin`, `.bincode`)
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl StateCodec for BincodeCodec {
    fn name(&self) -> &str {
        "bincode"
    }

    fn extensions(&self) -> &[&'static str] {
        &["bin", "bincode"]
    }

    fn save(&self, path: &Path, state: &StateMap) -> Result<()> {
        let encoded = bincode::serialize(state)?;
        std::fs::write(path, encoded)?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<StateMap> {
        let data = std::fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}

/// Extension → codec dispatch table
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: AHashMap<String, Rc<dyn StateCodec>>,
}

impl CodecRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the JSON and bincode codecs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Rc::new(JsonCodec));
        registry.register(Rc::new(BincodeCodec));
        registry
    }

    /// Route every extension of `codec` to it, replacing earlier codecs
    pub fn register(&mut self, codec: Rc<dyn StateCodec>) {
        for ext in codec.extensions() {
            self.codecs.insert(ext.to_ascii_lowercase(), Rc::clone(&codec));
        }
    }

    /// Codec registered for `format` (an extension without the dot)
    pub fn for_format(&self, format: &str) -> Option<Rc<dyn StateCodec>> {
        self.codecs.get(&format.to_ascii_lowercase()).cloned()
    }

    /// Codec for `path`'s extension
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` if no codec handles the extension.
    pub fn for_path(&self, path: &Path) -> Result<Rc<dyn StateCodec>> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.for_format(ext))
            .ok_or_else(|| BrainJitError::UnsupportedFormat {
                path: path.to_path_buf(),
                supported: self.supported(),
            })
    }

    /// Registered extensions, sorted
    pub fn supported(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.codecs.keys().cloned().collect();
        exts.sort();
        exts
    }
}
