use portable_pty::PtySize;

const DEFAULT_COLS: u16 = 80;
const DEFAULT_ROWS: u16 = 24;

/// Size for the new pty: the controlling terminal's size when stdin is one,
/// 80x24 otherwise.
pub fn initial_size() -> PtySize {
    let (cols, rows) = query_terminal_size().unwrap_or((DEFAULT_COLS, DEFAULT_ROWS));
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Query terminal size using ioctl TIOCGWINSZ.
fn query_terminal_size() -> Option<(u16, u16)> {
    unsafe {
        let mut ws: libc::winsize = std::mem::zeroed();
        if libc::ioctl(libc::STDIN_FILENO, libc::TIOCGWINSZ, &mut ws) == 0
            && ws.ws_col > 0
            && ws.ws_row > 0
        {
            Some((ws.ws_col, ws.ws_row))
        } else {
            None
        }
    }
}
