//! Setup and model file mutation
//!
//! The pipeline never generates OpenSim XML. It edits the few fields it has
//! to touch in files a user prepared:
//!
//! - [`SetupFile`]: tool setup documents (`model_file`, `final_time`,
//!   `results_directory`, `output_model_file`, `output_motion_file`)
//! - [`ModelFile`]: `.osim` models (model name, per-body masses)
//!
//! Edits are streamed through [`xml`] so the rest of the document is kept
//! as written.

pub mod xml;

use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Setup fields the pipeline rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetupField {
    /// `<model_file>`
    ModelFile,
    /// `<final_time>`
    FinalTime,
    /// `<results_directory>`
    ResultsDirectory,
    /// `<output_model_file>`
    OutputModelFile,
    /// `<output_motion_file>`
    OutputMotionFile,
}

impl SetupField {
    /// XML element name.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::ModelFile => "model_file",
            Self::FinalTime => "final_time",
            Self::ResultsDirectory => "results_directory",
            Self::OutputModelFile => "output_model_file",
            Self::OutputMotionFile => "output_motion_file",
        }
    }
}

impl fmt::Display for SetupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// A tool setup document held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFile {
    path: PathBuf,
    xml: String,
}

impl SetupFile {
    /// Read a setup file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let xml = std::fs::read_to_string(&path)?;
        Ok(Self { path, xml })
    }

    /// Setup from an in-memory document; `path` is where [`Self::save`] writes.
    #[must_use]
    pub fn from_xml(path: impl Into<PathBuf>, xml: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            xml: xml.into(),
        }
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw document.
    #[must_use]
    pub fn as_xml(&self) -> &str {
        &self.xml
    }

    /// Text of the `occurrence`-th (0-based) `field` element.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the setup has no such element
    pub fn field(&self, field: SetupField, occurrence: usize) -> Result<String> {
        xml::element_texts(&self.xml, field.tag())?
            .into_iter()
            .nth(occurrence)
            .ok_or_else(|| self.missing(field, occurrence))
    }

    /// Replace the text of the `occurrence`-th (0-based) `field` element.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if the setup has no such element
    pub fn set_field(&mut self, field: SetupField, occurrence: usize, value: &str) -> Result<()> {
        let edited = xml::replace_element_text(&self.xml, field.tag(), occurrence, value)?
            .ok_or_else(|| self.missing(field, occurrence))?;
        debug!(setup = %self.path.display(), %field, occurrence, value, "setup field set");
        self.xml = edited;
        Ok(())
    }

    /// Write back to the source path.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        self.save_as(&self.path)
    }

    /// Write to `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.xml)?;
        Ok(())
    }

    fn missing(&self, field: SetupField, occurrence: usize) -> Error {
        let item = if occurrence == 0 {
            format!("<{field}>")
        } else {
            format!("<{field}> #{occurrence}")
        };
        Error::mismatch(item, source_name(&self.path))
    }
}

/// An `.osim` model held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    path: PathBuf,
    xml: String,
}

impl ModelFile {
    /// Read a model file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let xml = std::fs::read_to_string(&path)?;
        Ok(Self { path, xml })
    }

    /// Source path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw document.
    #[must_use]
    pub fn as_xml(&self) -> &str {
        &self.xml
    }

    /// `name` attribute of the `<Model>` element.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if there is no `<Model>` element
    pub fn name(&self) -> Result<String> {
        xml::first_attribute(&self.xml, "Model", "name")?
            .ok_or_else(|| Error::mismatch("<Model name>", source_name(&self.path)))
    }

    /// Set the model name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` if there is no `<Model>` element
    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.xml = xml::set_first_attribute(&self.xml, "Model", "name", name)?
            .ok_or_else(|| Error::mismatch("<Model>", source_name(&self.path)))?;
        Ok(())
    }

    /// Body name → mass, in document order.
    ///
    /// # Errors
    ///
    /// Returns `Xml` if the document is malformed or a mass is not numeric
    pub fn body_masses(&self) -> Result<Vec<(String, f64)>> {
        xml::body_masses(&self.xml)
    }

    /// Overwrite the mass of every body in `masses`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigMismatch` naming the first body (alphabetically) that
    /// the model does not contain; the document is left unchanged then.
    pub fn apply_masses<'a, I>(&mut self, masses: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let table: FxHashMap<String, f64> = masses
            .into_iter()
            .map(|(name, mass)| (name.to_string(), mass))
            .collect();
        let (edited, missing) = xml::replace_body_masses(&self.xml, &table)?;
        if let Some(body) = missing.into_iter().next() {
            return Err(Error::mismatch(body, source_name(&self.path)));
        }
        debug!(model = %self.path.display(), bodies = table.len(), "masses applied");
        self.xml = edited;
        Ok(())
    }

    /// Write back to the source path.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        std::fs::write(&self.path, &self.xml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETUP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSimDocument Version="30000">
  <RRATool name="S1_A_Walk">
    <model_file>S1.osim</model_file>
    <results_directory>./</results_directory>
    <final_time>1.2</final_time>
    <output_model_file>S1_A_Walk__AdjustedCOM.osim</output_model_file>
  </RRATool>
</OpenSimDocument>
"#;

    #[test]
    fn test_setup_field_round_trip() {
        let mut setup = SetupFile::from_xml("S1_A_Walk__Setup_RRA.xml", SETUP);
        assert_eq!(setup.field(SetupField::ModelFile, 0).unwrap(), "S1.osim");
        setup
            .set_field(SetupField::ModelFile, 0, "S1_A_Walk.osim")
            .unwrap();
        assert_eq!(setup.field(SetupField::ModelFile, 0).unwrap(), "S1_A_Walk.osim");
        assert_eq!(setup.field(SetupField::FinalTime, 0).unwrap(), "1.2");
    }

    #[test]
    fn test_missing_setup_field() {
        let mut setup = SetupFile::from_xml("S1_A_Walk__Setup_RRA.xml", SETUP);
        let err = setup
            .set_field(SetupField::OutputMotionFile, 0, "x.mot")
            .unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("<output_motion_file>"));
        assert!(msg.contains("S1_A_Walk__Setup_RRA.xml"));

        let err = setup.field(SetupField::ModelFile, 1).unwrap_err();
        assert!(format!("{err}").contains("#1"));
    }
}
