//! AppleScript sources that drive the Simulator window through System Events.
//!
//! Each script returns a marker string on its last line. `osascript` can exit
//! zero without the script having run to the end (e.g. when accessibility
//! permission is missing), so callers check for the marker as well.

/// Returned by [`click_script`].
pub const TAP_MARKER: &str = "IOS_MCP_TAP_OK";
/// Returned by [`keystroke_script`].
pub const KEYSTROKE_MARKER: &str = "IOS_MCP_KEYSTROKE_OK";
/// Returned by [`paste_script`].
pub const PASTE_MARKER: &str = "IOS_MCP_PASTE_OK";
/// Returned by [`char_by_char_script`].
pub const CHARS_MARKER: &str = "IOS_MCP_CHARS_OK";

/// Virtual key codes used by the scripts.
mod key {
    pub const A: u8 = 0;
    pub const V: u8 = 9;
    pub const RETURN: u8 = 36;
    pub const TAB: u8 = 48;
}

/// Escape text for use inside an AppleScript string literal.
///
/// Backslashes are doubled before quotes are escaped, so the quote escapes
/// are not themselves doubled.
pub fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn focus_simulator(settle: &str) -> String {
    format!(
        r#"tell application "Simulator"
    activate
end tell
delay {settle}
"#
    )
}

/// Click at absolute screen coordinates over the Simulator window.
pub fn click_script(x: f64, y: f64) -> String {
    format!(
        r#"{focus}tell application "System Events"
    tell process "Simulator"
        set frontmost to true
        click at {{{x}, {y}}}
    end tell
end tell
return "{marker}""#,
        focus = focus_simulator("0.5"),
        x = x.round() as i64,
        y = y.round() as i64,
        marker = TAP_MARKER,
    )
}

/// Select all in the focused field, then type `text` in one keystroke command.
pub fn keystroke_script(text: &str) -> String {
    format!(
        r#"{focus}tell application "System Events"
    tell process "Simulator"
        set frontmost to true
        delay 0.5
        key code {select} using {{command down}}
        delay 0.2
        keystroke "{text}"
    end tell
end tell
return "{marker}""#,
        focus = focus_simulator("1.0"),
        select = key::A,
        text = escape(text),
        marker = KEYSTROKE_MARKER,
    )
}

/// Paste the simulator pasteboard into the focused field.
pub fn paste_script() -> String {
    format!(
        r#"{focus}tell application "System Events"
    tell process "Simulator"
        set frontmost to true
        delay 0.3
        key code {paste} using {{command down}}
    end tell
end tell
return "{marker}""#,
        focus = focus_simulator("0.5"),
        paste = key::V,
        marker = PASTE_MARKER,
    )
}

/// Select all, then type `text` one character at a time.
pub fn char_by_char_script(text: &str) -> String {
    let mut body = String::new();
    for c in text.chars() {
        match c {
            '\n' => body.push_str(&format!("        key code {}\n", key::RETURN)),
            '\t' => body.push_str(&format!("        key code {}\n", key::TAB)),
            '\r' => continue,
            other => body.push_str(&format!(
                "        keystroke \"{}\"\n",
                escape(other.encode_utf8(&mut [0u8; 4]))
            )),
        }
        body.push_str("        delay 0.05\n");
    }

    format!(
        r#"{focus}tell application "System Events"
    tell process "Simulator"
        set frontmost to true
        delay 0.3
        key code {select} using {{command down}}
        delay 0.2
{body}    end tell
end tell
return "{marker}""#,
        focus = focus_simulator("0.5"),
        select = key::A,
        body = body,
        marker = CHARS_MARKER,
    )
}
