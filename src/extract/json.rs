//! JSON modules: one export per top-level key.

use crate::model::{Declaration, ExportEntry};

use super::extractor::{ExportSlot, ExtractedModule};

/// Non-object documents and invalid JSON have no exports.
pub fn extract_json(content: &str) -> ExtractedModule {
    let value: serde_json::Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Invalid JSON module: {}", e);
            return ExtractedModule::default();
        }
    };

    let Some(object) = value.as_object() else {
        return ExtractedModule::default();
    };

    let slots = object
        .iter()
        .map(|(key, value)| {
            let rendered =
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            ExportSlot::Entry(ExportEntry::new(key, Declaration::Json { value: rendered }))
        })
        .collect();

    ExtractedModule {
        slots,
        ..Default::default()
    }
}
