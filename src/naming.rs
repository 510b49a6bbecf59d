//! Display-name decoding and filesystem-safe name composition.
//!
//! Display names arrive with literal `\uXXXX` escapes for non-Latin script.
//! [`decode_escapes`] turns them back into text; [`compose_name`] goes one step
//! further and produces a name restricted to `[a-zA-Z0-9._-]`, spelling CJK
//! ideographs out as pinyin.

use pinyin::ToPinyin;

const ESCAPE_PREFIX: &str = "\\u";

/// Decode well-formed `\uXXXX` escapes and trim surrounding whitespace.
///
/// Malformed escapes (fewer than four hex digits, non-hex, or a lone
/// surrogate) are copied through unchanged.
pub fn decode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find(ESCAPE_PREFIX) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx + ESCAPE_PREFIX.len()..];
        match tail.get(..4).and_then(decode_hex4) {
            Some(ch) => {
                out.push(ch);
                rest = &tail[4..];
            }
            None => {
                out.push_str(ESCAPE_PREFIX);
                rest = tail;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

fn decode_hex4(hex: &str) -> Option<char> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
}

/// Compose a filesystem and identifier safe name from a display name.
pub fn compose_name(input: &str) -> String {
    let decoded = decode_escapes(input);
    let mut out = String::with_capacity(decoded.len());

    for ch in decoded.chars() {
        if is_cjk_ideograph(ch) {
            match ch.to_pinyin() {
                Some(reading) => out.push_str(reading.plain()),
                None => out.push('_'),
            }
        } else if is_safe_char(ch) {
            out.push(ch);
        } else {
            out.push('_');
        }
    }

    tracing::debug!(input = %decoded, name = %out, "composed safe name");
    out
}

fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-')
}

fn is_cjk_ideograph(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xF900..=0xFAFF
            | 0x20000..=0x2A6DF
            | 0x2A700..=0x2EBEF
            | 0x30000..=0x3134F
    )
}

/// Size label for a memory request in MiB. Unknown sizes are `small`.
pub fn memory_class(memory_mib: u32) -> &'static str {
    match memory_mib {
        128 => "micro",
        256 => "small",
        512 => "medium",
        1024 => "large",
        2048 => "2xlarge",
        4096 => "4xlarge",
        8192 => "8xlarge",
        16384 => "16xlarge",
        32768 => "32xlarge",
        65536 => "64xlarge",
        _ => "small",
    }
}
