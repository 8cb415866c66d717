// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Field data validation, run before anything is written to the device.

use cardwerk_core::FieldData;
use cardwerk_core::error::{CardwerkError, Result};

/// Check that every declared template field has a non-empty value.
///
/// Reports all offending fields in declaration order. Extra supplied fields
/// are ignored.
pub fn validate_fields(declared: &[String], supplied: &FieldData) -> Result<()> {
    let missing: Vec<String> = declared
        .iter()
        .filter(|name| supplied.get(name.as_str()).is_none_or(|v| v.is_empty()))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CardwerkError::Validation { fields: missing })
    }
}
