//! Lexes and parses the `key=value,...;payload` grammar into a [`Command`]
//! (spec.md §4.1).

use crate::protocol::command::{Action, Command, DeleteSpecifier, Quiet, TransmissionMedium};

struct KeyValue<'a> {
    key: u8,
    value: &'a [u8],
}

/// Parses a command buffer that starts right after the leading `G`
/// sentinel. Unknown keys or malformed numerics are recorded in
/// `cmd.errors` but parsing continues, so the best-effort reply still has
/// `a`/`i`/`I`.
pub fn parse(buf: &[u8]) -> Command {
    let mut cmd = Command::default();

    let (header, payload) = match buf.iter().position(|&b| b == b';') {
        Some(i) => (&buf[..i], &buf[i + 1..]),
        None => (buf, &b""[..]),
    };
    cmd.payload = payload.to_vec();

    let pairs = lex_pairs(header, &mut cmd);

    // Resolve 'a' first (it disambiguates 's'/'v'/'c'/'r'/'X'/'Y'/'z'),
    // then 'i'/'I' for clearer error reporting, then everything else.
    for &order_key in &[b'a', b'i', b'I'] {
        for kv in &pairs {
            if kv.key == order_key {
                apply(&mut cmd, kv);
            }
        }
    }
    for kv in &pairs {
        if kv.key != b'a' && kv.key != b'i' && kv.key != b'I' {
            apply(&mut cmd, kv);
        }
    }

    cmd
}

fn lex_pairs<'a>(header: &'a [u8], cmd: &mut Command) -> Vec<KeyValue<'a>> {
    let mut pairs = Vec::new();
    for field in header.split(|&b| b == b',') {
        if field.is_empty() {
            continue;
        }
        let Some(eq) = field.iter().position(|&b| b == b'=') else {
            cmd.errors.push(format!("key without value: {}", lossy(field)));
            continue;
        };
        let key_bytes = &field[..eq];
        if key_bytes.len() != 1 {
            cmd.errors.push(format!("unknown key of length {}: {}", key_bytes.len(), lossy(key_bytes)));
            continue;
        }
        pairs.push(KeyValue { key: key_bytes[0], value: &field[eq + 1..] });
    }
    pairs
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_char_value(cmd: &mut Command, key: u8, value: &[u8]) -> Option<u8> {
    if value.len() != 1 {
        cmd.errors.push(format!("value of '{}' must be a single char", key as char));
        return None;
    }
    Some(value[0])
}

fn parse_num_value(cmd: &mut Command, key: u8, value: &[u8]) -> Option<i64> {
    match std::str::from_utf8(value).ok().and_then(|s| s.parse::<i64>().ok()) {
        Some(n) => Some(n),
        None => {
            cmd.errors.push(format!("could not parse number value of '{}': {}", key as char, lossy(value)));
            None
        }
    }
}

fn apply(cmd: &mut Command, kv: &KeyValue<'_>) {
    match kv.key {
        b'a' => {
            if let Some(c) = parse_char_value(cmd, b'a', kv.value) {
                match Action::from_char(c) {
                    Some(a) => cmd.action = Some(a),
                    None => cmd.errors.push(format!("unsupported action: {}", c as char)),
                }
            }
        }
        b't' => {
            if let Some(c) = parse_char_value(cmd, b't', kv.value) {
                match TransmissionMedium::from_char(c) {
                    Some(m) => cmd.transmission_medium = Some(m),
                    None => cmd.errors.push(format!("unsupported transmission medium: {}", c as char)),
                }
            }
        }
        b'd' => {
            if let Some(c) = parse_char_value(cmd, b'd', kv.value) {
                match DeleteSpecifier::from_char(c) {
                    Some(d) => cmd.delete_specifier = Some(d),
                    None => cmd.errors.push(format!("unsupported delete specifier: {}", c as char)),
                }
            }
        }
        b'o' => {
            if let Some(c) = parse_char_value(cmd, b'o', kv.value) {
                if c == b'z' {
                    cmd.compression_zlib = true;
                } else {
                    cmd.errors.push(format!("unsupported compression specification: {}", c as char));
                }
            }
        }
        b'q' => {
            if let Some(n) = parse_num_value(cmd, b'q', kv.value) {
                cmd.quiet = Quiet::from_num(n);
            }
        }
        b'f' => {
            if let Some(n) = parse_num_value(cmd, b'f', kv.value) {
                if !matches!(n, 0 | 24 | 32 | 100) {
                    cmd.errors.push(format!("unsupported format specification: {n}"));
                }
                cmd.format = n;
            }
        }
        b's' => {
            if let Some(n) = parse_num_value(cmd, b's', kv.value) {
                if cmd.action == Some(Action::AnimationControl) {
                    cmd.animation_state = n;
                } else {
                    cmd.frame_pix_width = n;
                }
            }
        }
        b'v' => {
            if let Some(n) = parse_num_value(cmd, b'v', kv.value) {
                if cmd.action == Some(Action::AnimationControl) {
                    cmd.loops = n;
                } else {
                    cmd.frame_pix_height = n;
                }
            }
        }
        b'i' => {
            if let Some(n) = parse_num_value(cmd, b'i', kv.value) {
                cmd.image_id = n as u32;
            }
        }
        b'I' => {
            if let Some(n) = parse_num_value(cmd, b'I', kv.value) {
                cmd.image_number = n as u32;
            }
        }
        b'p' => {
            if let Some(n) = parse_num_value(cmd, b'p', kv.value) {
                cmd.placement_id = n as u32;
            }
        }
        b'x' => {
            if let Some(n) = parse_num_value(cmd, b'x', kv.value) {
                cmd.src_pix_x = n;
                cmd.frame_dst_pix_x = n;
            }
        }
        b'y' => {
            if let Some(n) = parse_num_value(cmd, b'y', kv.value) {
                if cmd.action == Some(Action::FrameAppend) {
                    cmd.frame_dst_pix_y = n;
                } else {
                    cmd.src_pix_y = n;
                }
            }
        }
        b'w' => {
            if let Some(n) = parse_num_value(cmd, b'w', kv.value) {
                cmd.src_pix_width = n;
            }
        }
        b'h' => {
            if let Some(n) = parse_num_value(cmd, b'h', kv.value) {
                cmd.src_pix_height = n;
            }
        }
        b'c' => {
            if let Some(n) = parse_num_value(cmd, b'c', kv.value) {
                match cmd.action {
                    Some(Action::FrameAppend) => cmd.background_frame = n,
                    Some(Action::AnimationControl) => cmd.current_frame = n,
                    _ => cmd.columns = n,
                }
            }
        }
        b'r' => {
            if let Some(n) = parse_num_value(cmd, b'r', kv.value) {
                match cmd.action {
                    Some(Action::FrameAppend) | Some(Action::AnimationControl) => cmd.edit_frame = n,
                    _ => cmd.rows = n,
                }
            }
        }
        b'm' => {
            if let Some(n) = parse_num_value(cmd, b'm', kv.value) {
                cmd.is_data_transmission = true;
                cmd.more = n;
            }
        }
        b'S' => {
            if let Some(n) = parse_num_value(cmd, b'S', kv.value) {
                cmd.size = n;
            }
        }
        b'U' => {
            if let Some(n) = parse_num_value(cmd, b'U', kv.value) {
                cmd.virtual_ = n != 0;
            }
        }
        b'X' => {
            if let Some(n) = parse_num_value(cmd, b'X', kv.value) {
                if cmd.action == Some(Action::FrameAppend) {
                    cmd.replace_instead_of_blending = n != 0;
                }
            }
        }
        b'Y' => {
            if let Some(n) = parse_num_value(cmd, b'Y', kv.value) {
                if cmd.action == Some(Action::FrameAppend) {
                    cmd.background_color = n as u32;
                }
            }
        }
        b'z' => {
            if let Some(n) = parse_num_value(cmd, b'z', kv.value) {
                if matches!(cmd.action, Some(Action::FrameAppend) | Some(Action::AnimationControl)) {
                    cmd.gap = n;
                }
            }
        }
        b'C' => {
            if let Some(n) = parse_num_value(cmd, b'C', kv.value) {
                cmd.do_not_move_cursor = n != 0;
            }
        }
        other => cmd.errors.push(format!("unsupported key: {}", other as char)),
    }
}
