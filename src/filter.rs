//! Extension and MIME denylist checked before any file I/O.
//!
//! A pass guarantees nothing about the content; it only spares the scanner
//! uploads that announce themselves as executables.

use crate::config::FilterLists;
use crate::models::QuickCheck;
use crate::utils::final_extension;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct QuickFilter {
    extensions: HashSet<String>,
    mime_types: HashSet<String>,
}

impl Default for QuickFilter {
    fn default() -> Self {
        Self::new(FilterLists::default())
    }
}

impl QuickFilter {
    pub fn new(lists: FilterLists) -> Self {
        let normalize_ext = |e: String| {
            let e = e.trim().to_lowercase();
            if e.starts_with('.') {
                e
            } else {
                format!(".{}", e)
            }
        };
        Self {
            extensions: lists.dangerous_extensions.into_iter().map(normalize_ext).collect(),
            mime_types: lists
                .dangerous_mime_types
                .into_iter()
                .map(|m| m.trim().to_lowercase())
                .collect(),
        }
    }

    /// Judge the final extension of `filename`, then the declared MIME type.
    pub fn quick_validation(&self, mime_type: &str, filename: &str) -> QuickCheck {
        if let Some(ext) = final_extension(filename) {
            if self.extensions.contains(&ext) {
                log::debug!("Quick filter blocked extension {} ({})", ext, filename);
                return QuickCheck::block("file extension not allowed");
            }
        }

        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if self.mime_types.contains(&essence) {
            log::debug!("Quick filter blocked MIME type {}", essence);
            return QuickCheck::block("file type not allowed");
        }

        QuickCheck::pass()
    }
}
