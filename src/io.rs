/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! I/O and report ambient). Intentionally thin: a binary
//! little-endian reader for 8/16/32/64-bit sample widths, an ASCII
//! one-value-per-line reader, and the textual report writer. This is
//! not a general-purpose format-conversion toolkit - it exists so the
//! crate is runnable end to end.

use byteorder::{ByteOrder, LittleEndian};

use crate::errors::{err_exit_code, ExitCode};
use crate::orchestrator::AssessmentResult;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    U8,
    U16,
    U32,
    U64,
}

impl SampleWidth {
    fn bytes(self) -> usize {
        match self {
            SampleWidth::U8 => 1,
            SampleWidth::U16 => 2,
            SampleWidth::U32 => 4,
            SampleWidth::U64 => 8,
        }
    }
}

/// Infers a sample width from a filename suffix convention
/// (`-u8.bin`, `-u16.bin`, `-u32.bin`, `-u64.bin`); `-sd.bin` ("sample
/// data") falls back to `U8`, the most common width in practice.
/// Returns `None` for a filename carrying no recognizable suffix, so
/// the caller can fall back to an explicit `--width` flag.
pub fn infer_width_from_filename(path: &str) -> Option<SampleWidth> {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with("-u8.bin") || lower.ends_with("-sd.bin") {
        Some(SampleWidth::U8)
    } else if lower.ends_with("-u16.bin") {
        Some(SampleWidth::U16)
    } else if lower.ends_with("-u32.bin") {
        Some(SampleWidth::U32)
    } else if lower.ends_with("-u64.bin") {
        Some(SampleWidth::U64)
    } else {
        None
    }
}

/// Reads `bytes` as a little-endian stream of `width`-wide unsigned
/// integers, widened to `u64` for `translate` to normalise.
pub fn read_binary_le(bytes: &[u8], width: SampleWidth) -> Result<Vec<u64>> {
    let stride = width.bytes();
    if bytes.is_empty() || bytes.len() % stride != 0 {
        return err_exit_code(
            ExitCode::InputMalformed,
            "read_binary_le: input length is not a multiple of the sample width",
        );
    }

    let samples = bytes
        .chunks_exact(stride)
        .map(|chunk| match width {
            SampleWidth::U8 => chunk[0] as u64,
            SampleWidth::U16 => LittleEndian::read_u16(chunk) as u64,
            SampleWidth::U32 => LittleEndian::read_u32(chunk) as u64,
            SampleWidth::U64 => LittleEndian::read_u64(chunk),
        })
        .collect();

    Ok(samples)
}

/// Reads one integer or floating-point value per line; blank lines are
/// skipped. Floating-point lines are accepted (SP 800-90B sample
/// corpora occasionally ship pre-quantised floats) and rounded to the
/// nearest `u64`; negative, non-finite, or out-of-range values are
/// rejected as malformed input.
pub fn read_ascii(text: &str) -> Result<Vec<u64>> {
    let mut samples = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Ok(v) = trimmed.parse::<u64>() {
            samples.push(v);
            continue;
        }

        let parsed: f64 = trimmed.parse().map_err(|_| {
            anyhow::anyhow!(
                "{:?}: read_ascii: line {} is not a valid integer or float ({:?})",
                ExitCode::InputMalformed,
                line_no + 1,
                trimmed
            )
        })?;

        if !parsed.is_finite() || parsed < 0.0 || parsed > u64::MAX as f64 {
            return err_exit_code(
                ExitCode::InputMalformed,
                format!("read_ascii: line {} out of representable range", line_no + 1),
            );
        }

        samples.push(parsed.round() as u64);
    }

    if samples.is_empty() {
        return err_exit_code(ExitCode::InputMalformed, "read_ascii: no samples found");
    }

    Ok(samples)
}

/// Formats an `f64` with at least 17 significant digits (round-trip
/// safe for any finite `f64`).
pub fn format_d17(value: f64) -> String {
    format!("{:.17e}", value)
}

fn estimator_display_name(key: &str) -> &'static str {
    match key {
        "mcv" => "Most Common Value",
        "collision" => "Collision",
        "markov" => "Markov",
        "compression" => "Compression",
        "t_tuple" => "t-Tuple",
        "lrs" => "LRS",
        "multi_mcw" => "MultiMCW Prediction",
        "lag" => "Lag Prediction",
        "multi_mmc" => "MultiMMC Prediction",
        "lz78y" => "LZ78Y Prediction",
        other => other,
    }
}

/// Renders the textual report: one "Literal <Estimator> Estimate" line
/// per bootstrapped estimator, in the fixed order the bootstrap
/// produced them, followed by the final assessed min-entropy line.
pub fn write_report(assessment: &AssessmentResult) -> String {
    let mut out = String::new();

    for &(name, entropy) in &assessment.entropy_bootstrap.per_estimator {
        out.push_str(&format!(
            "Literal {} Estimate: min entropy = {}\n",
            estimator_display_name(name),
            format_d17(entropy)
        ));
    }

    if let Some(params) = &assessment.parameter_bootstrap {
        for &(name, entropy) in params {
            out.push_str(&format!(
                "Bootstrapped {} Parameter Estimate: min entropy = {}\n",
                estimator_display_name(name),
                format_d17(entropy)
            ));
        }
    }

    if let Some(iid) = assessment.iid_track_entropy {
        out.push_str(&format!("IID Track Most Common Value Estimate: min entropy = {}\n", format_d17(iid)));
    }

    out.push_str(&format!("Assessed min entropy = {}\n", format_d17(assessment.assessed_min_entropy)));

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_width_from_known_suffixes() {
        assert_eq!(infer_width_from_filename("sample-u8.bin"), Some(SampleWidth::U8));
        assert_eq!(infer_width_from_filename("sample-u16.bin"), Some(SampleWidth::U16));
        assert_eq!(infer_width_from_filename("sample-u32.bin"), Some(SampleWidth::U32));
        assert_eq!(infer_width_from_filename("sample-u64.bin"), Some(SampleWidth::U64));
        assert_eq!(infer_width_from_filename("sample-sd.bin"), Some(SampleWidth::U8));
        assert_eq!(infer_width_from_filename("sample.dat"), None);
    }

    #[test]
    fn reads_little_endian_u32_stream() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0, 255, 255, 255, 255];
        let samples = read_binary_le(&bytes, SampleWidth::U32).unwrap();
        assert_eq!(samples, vec![1, 2, 0xFFFF_FFFF]);
    }

    #[test]
    fn rejects_binary_input_not_aligned_to_width() {
        let bytes = [1u8, 2, 3];
        assert!(read_binary_le(&bytes, SampleWidth::U32).is_err());
    }

    #[test]
    fn reads_ascii_integers_and_floats() {
        let text = "1\n2\n\n3.0\n";
        let samples = read_ascii(text).unwrap();
        assert_eq!(samples, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_negative_ascii_value() {
        let text = "1\n-2\n";
        assert!(read_ascii(text).is_err());
    }

    #[test]
    fn format_d17_round_trips() {
        let value = std::f64::consts::PI;
        let formatted = format_d17(value);
        let parsed: f64 = formatted.parse().unwrap();
        assert!((parsed - value).abs() < 1e-15);
    }
}
