use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const MODEL_FILE: &str = "model.onnx";
pub const VOCAB_FILE: &str = "vocab.txt";

/// Files making up an exported F5 checkpoint.
#[derive(Debug, Clone)]
pub struct ModelAssets {
    pub model_path: PathBuf,
    pub vocab_path: PathBuf,
}

impl ModelAssets {
    pub fn locate(model_dir: &Path) -> Result<Self, AppError> {
        let model_path = model_dir.join(MODEL_FILE);
        let vocab_path = model_dir.join(VOCAB_FILE);

        for path in [&model_path, &vocab_path] {
            if !path.exists() {
                return Err(AppError::ModelLoad(format!(
                    "missing {}",
                    path.display()
                )));
            }
        }

        Ok(Self {
            model_path,
            vocab_path,
        })
    }
}

/// Character vocabulary: one token per line, the line number is the id.
#[derive(Debug, Clone)]
pub struct Vocab {
    ids: HashMap<String, i32>,
}

impl Vocab {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, AppError> {
        let mut ids = HashMap::new();
        for (id, line) in reader.lines().enumerate() {
            let line = line?;
            // Strip only the line terminator; " " is a real token.
            let token = line.strip_suffix('\r').unwrap_or(&line).to_string();
            ids.entry(token).or_insert(id as i32);
        }

        if ids.is_empty() {
            return Err(AppError::ModelLoad("vocabulary is empty".to_string()));
        }

        Ok(Self { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Map each character to its id. Unknown characters map to 0.
    pub fn encode(&self, text: &str) -> Vec<i32> {
        let mut buf = [0u8; 4];
        text.chars()
            .map(|c| *self.ids.get(&*c.encode_utf8(&mut buf)).unwrap_or(&0))
            .collect()
    }
}
