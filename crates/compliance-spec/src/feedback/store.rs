use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::error::FormError;
use crate::spec::feedback::FeedbackFile;

/// Outcome of reading a feedback file; a parse failure is kept distinct from absence.
#[derive(Debug)]
pub enum FeedbackLoad {
    Absent,
    Loaded(FeedbackFile),
    Malformed(FormError),
}

impl FeedbackLoad {
    /// Parse feedback text. Blank text and `{}` mean no feedback has been written yet.
    pub fn from_json(form_id: &str, text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return FeedbackLoad::Absent;
        }
        match serde_json::from_str::<FeedbackFile>(trimmed) {
            Ok(feedback) => FeedbackLoad::Loaded(feedback),
            Err(source) => FeedbackLoad::Malformed(FormError::FeedbackParse {
                form_id: form_id.to_string(),
                source,
            }),
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, FeedbackLoad::Malformed(_))
    }

    pub fn feedback(&self) -> Option<&FeedbackFile> {
        match self {
            FeedbackLoad::Loaded(feedback) => Some(feedback),
            FeedbackLoad::Absent | FeedbackLoad::Malformed(_) => None,
        }
    }
}

/// Directory of `<form_id>.json` feedback files. Last write wins per form.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    root: PathBuf,
}

impl FeedbackStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `form_id`, keeping only alphanumerics and hyphens.
    pub fn path_for(&self, form_id: &str) -> PathBuf {
        let safe = form_id
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
            .collect::<String>();
        self.root.join(format!("{safe}.json"))
    }

    pub fn load(&self, form_id: &str) -> FeedbackLoad {
        let path = self.path_for(form_id);
        match fs::read_to_string(&path) {
            Ok(text) => {
                let load = FeedbackLoad::from_json(form_id, &text);
                if let FeedbackLoad::Malformed(err) = &load {
                    tracing::warn!(path = %path.display(), "malformed feedback file: {}", err);
                }
                load
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => FeedbackLoad::Absent,
            Err(source) => FeedbackLoad::Malformed(FormError::Io { path, source }),
        }
    }

    /// Merge `incoming` into the stored file: top-level fields are replaced,
    /// `control_notes` entries are merged per control. Stamps `last_updated`.
    /// A malformed stored file is reported rather than overwritten.
    pub fn write(&self, form_id: &str, incoming: &Value) -> Result<FeedbackFile, FormError> {
        let existing = match self.load(form_id) {
            FeedbackLoad::Absent => Map::new(),
            FeedbackLoad::Loaded(feedback) => match serde_json::to_value(feedback) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => Map::new(),
                Err(err) => return Err(FormError::JsonEncode(err)),
            },
            FeedbackLoad::Malformed(err) => return Err(err),
        };

        let mut merged = existing.clone();
        if let Some(incoming) = incoming.as_object() {
            for (key, value) in incoming {
                merged.insert(key.clone(), value.clone());
            }
            if let (Some(Value::Object(old)), Some(Value::Object(new))) =
                (existing.get("control_notes"), incoming.get("control_notes"))
            {
                let mut notes = old.clone();
                notes.extend(new.iter().map(|(key, value)| (key.clone(), value.clone())));
                merged.insert("control_notes".into(), Value::Object(notes));
            }
        }
        merged.insert("form_id".into(), Value::String(form_id.to_string()));

        let feedback = serde_json::from_value::<FeedbackFile>(Value::Object(merged)).map_err(
            |source| FormError::FeedbackParse {
                form_id: form_id.to_string(),
                source,
            },
        )?;
        self.save(feedback)
    }

    /// Replace the stored file with `feedback`, stamping `last_updated`.
    pub fn save(&self, mut feedback: FeedbackFile) -> Result<FeedbackFile, FormError> {
        feedback.last_updated = Some(Utc::now());
        let path = self.path_for(&feedback.form_id);
        fs::create_dir_all(&self.root).map_err(|source| FormError::Io {
            path: self.root.clone(),
            source,
        })?;
        let body = serde_json::to_string_pretty(&feedback).map_err(FormError::JsonEncode)?;
        fs::write(&path, body).map_err(|source| FormError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "feedback written");
        Ok(feedback)
    }

    /// Load, edit and save. A malformed file is reported rather than overwritten.
    pub fn update(
        &self,
        form_id: &str,
        edit: impl FnOnce(&mut FeedbackFile),
    ) -> Result<FeedbackFile, FormError> {
        let mut feedback = match self.load(form_id) {
            FeedbackLoad::Absent => FeedbackFile::new(form_id),
            FeedbackLoad::Loaded(feedback) => feedback,
            FeedbackLoad::Malformed(err) => return Err(err),
        };
        edit(&mut feedback);
        self.save(feedback)
    }
}
