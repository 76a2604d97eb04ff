//! Key binding parser — "Super+Shift+C" → (modifier mask, keycode).
//!
//! Parses user-provided key binding strings into X11 modifier masks
//! and keycodes.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, Keysym, ModMask, Setup};

use super::HotkeyError;

/// A parsed key binding ready for X11 grab registration.
#[derive(Debug, Clone)]
pub struct Binding {
    /// X11 modifier mask (e.g., Shift | Mod4).
    pub modifiers: u16,
    /// X11 keycode for the key.
    pub keycode: u8,
    /// X11 keysym for display/logging.
    #[allow(dead_code)]
    pub keysym: Keysym,
    /// Original user-provided string.
    pub raw: String,
}

/// Parse a key binding specification string into an X11 binding.
///
/// Format: `Modifier[+Modifier...]+Key`
///
/// Modifiers: `Shift`, `Control`/`Ctrl`, `Alt`, `Super`
/// Keys: single letter (A-Z), digit (0-9), F1-F12, or named key
/// (space, return, escape, tab, backspace).
///
/// At least one modifier is required — bare keys are rejected to avoid
/// grabbing ordinary typing.
pub fn parse_binding(
    spec: &str,
    conn: &impl Connection,
    setup: &Setup,
) -> Result<Binding, HotkeyError> {
    let parts: Vec<&str> = spec.split('+').map(str::trim).collect();

    if parts.is_empty() {
        return Err(HotkeyError::InvalidBinding("empty binding".into()));
    }
    if parts.len() < 2 {
        return Err(HotkeyError::InvalidBinding(format!(
            "bare key without modifier: {spec:?}"
        )));
    }

    // Last part is the key name, everything before is modifiers.
    let (modifier_parts, key_name) = parts.split_at(parts.len() - 1);
    let key_name = key_name[0];

    // Parse modifiers.
    let mut modifiers: u16 = 0;
    for &m in modifier_parts {
        let mask = parse_modifier(m)
            .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown modifier: {m:?}")))?;
        modifiers |= mask;
    }

    if modifiers == 0 {
        return Err(HotkeyError::InvalidBinding(format!(
            "no valid modifiers in: {spec:?}"
        )));
    }

    // Parse key name → keysym.
    let keysym = key_name_to_keysym(key_name)
        .ok_or_else(|| HotkeyError::InvalidBinding(format!("unknown key: {key_name:?}")))?;

    // Resolve keysym → keycode via keyboard mapping.
    let keycode = keysym_to_keycode(conn, setup, keysym).ok_or_else(|| {
        HotkeyError::InvalidBinding(format!(
            "keysym 0x{keysym:04x} not found in keyboard mapping"
        ))
    })?;

    Ok(Binding {
        modifiers,
        keycode,
        keysym,
        raw: spec.to_string(),
    })
}

/// Parse a modifier name to its X11 modifier mask bits.
fn parse_modifier(name: &str) -> Option<u16> {
    match name.to_ascii_lowercase().as_str() {
        "shift" => Some(ModMask::SHIFT.into()),
        "control" | "ctrl" => Some(ModMask::CONTROL.into()),
        "alt" | "mod1" => Some(u16::from(ModMask::M1)),
        "super" | "mod4" => Some(u16::from(ModMask::M4)),
        _ => None,
    }
}

/// Map a key name to an X11 keysym.
///
/// Supports single ASCII letters (A-Z), digits (0-9), function keys
/// (F1-F12), and common named keys.
fn key_name_to_keysym(name: &str) -> Option<Keysym> {
    // Single ASCII letter → lowercase keysym.
    if name.len() == 1 {
        let ch = name.chars().next()?;
        if ch.is_ascii_alphabetic() {
            return Some(ch.to_ascii_lowercase() as Keysym);
        }
        if ch.is_ascii_digit() {
            return Some(ch as Keysym);
        }
    }

    // Function keys.
    if let Some(rest) = name.strip_prefix('F').or_else(|| name.strip_prefix('f'))
        && let Ok(n) = rest.parse::<u32>()
        && (1..=12).contains(&n)
    {
        // XK_F1 = 0xffbe, XK_F2 = 0xffbf, ...
        return Some(0xffbe + n - 1);
    }

    // Named keys (case-insensitive).
    match name.to_ascii_lowercase().as_str() {
        "space" => Some(0x0020),
        "return" | "enter" => Some(0xff0d),
        "escape" | "esc" => Some(0xff1b),
        "tab" => Some(0xff09),
        "backspace" => Some(0xff08),
        "delete" => Some(0xffff),
        "insert" => Some(0xff63),
        "home" => Some(0xff50),
        "end" => Some(0xff57),
        "page_up" | "pageup" | "prior" => Some(0xff55),
        "page_down" | "pagedown" | "next" => Some(0xff56),
        "up" => Some(0xff52),
        "down" => Some(0xff54),
        "left" => Some(0xff51),
        "right" => Some(0xff53),
        _ => None,
    }
}

/// Resolve a keysym to a keycode using the server's keyboard mapping.
///
/// Returns the first matching keycode, or `None` if the keysym is
/// not present in any keycode's keysym list.
fn keysym_to_keycode(conn: &impl Connection, setup: &Setup, keysym: Keysym) -> Option<u8> {
    let min_keycode = setup.min_keycode;
    let max_keycode = setup.max_keycode;
    let count = max_keycode - min_keycode + 1;

    let reply = xproto::get_keyboard_mapping(conn, min_keycode, count)
        .ok()?
        .reply()
        .ok()?;

    let syms_per_code = reply.keysyms_per_keycode as usize;
    if syms_per_code == 0 {
        return None;
    }

    for i in 0..count as usize {
        let base = i * syms_per_code;
        for j in 0..syms_per_code {
            if reply.keysyms.get(base + j) == Some(&keysym) {
                return Some(min_keycode + i as u8);
            }
        }
    }

    None
}

/// Check if a key event matches a binding.
///
/// Masks out CapsLock (LockMask) and NumLock from the event state
/// before comparing, so hotkeys fire regardless of lock key state.
///
/// `numlock_mask` is the dynamically detected modifier bit for NumLock
/// (usually Mod2 / 0x0010, but may differ per X11 server configuration).
pub fn event_matches_binding(
    event_keycode: u8,
    event_state: u16,
    binding: &Binding,
    numlock_mask: u16,
) -> bool {
    // Mask out lock bits: CapsLock = LOCK (bit 1), NumLock = detected bit.
    let lock_mask: u16 = u16::from(ModMask::LOCK) | numlock_mask;
    let clean_state = event_state & !lock_mask;
    // Also mask out mouse button bits (bits 8-12) — only compare modifier bits.
    let modifier_mask: u16 = 0x00ff;
    let clean_mods = clean_state & modifier_mask;

    event_keycode == binding.keycode && clean_mods == binding.modifiers
}
