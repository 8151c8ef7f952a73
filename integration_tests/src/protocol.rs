//! 2-byte command/response protocol helpers (mirrors the firmware).

/// Footer a command must carry to be accepted.
pub const COMMAND_FOOTER: u8 = 1;

/// Footer the firmware sends with every confirmation.
pub const CONFIRMATION_FOOTER: u8 = 1;

pub const CMD_LED_ON: u8 = 1;
pub const CMD_LED_OFF: u8 = 2;

/// Build a 2-byte command frame.
pub fn build_command(code: u8, footer: u8) -> [u8; 2] {
    [code, footer]
}

/// Split a 2-byte response frame into (code, footer).
pub fn parse_response(frame: &[u8]) -> anyhow::Result<(u8, u8)> {
    if frame.len() != 2 {
        anyhow::bail!("Expected 2-byte response, got {} bytes", frame.len());
    }
    Ok((frame[0], frame[1]))
}
