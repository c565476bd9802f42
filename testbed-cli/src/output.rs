// Output formatting helpers for CLI commands
// Everything goes to stderr so stdout stays clean for `--json`

const BOLD: &str = "1";
const BOLD_CYAN: &str = "1;36";
const BOLD_GREEN: &str = "1;32";
const BOLD_RED: &str = "1;31";
const BOLD_BLUE: &str = "1;34";
const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";
const CYAN: &str = "36";
const DIM: &str = "2";

fn paint(style: &str, text: &str) -> String {
    format!("\x1b[{}m{}\x1b[0m", style, text)
}

/// Right-aligned action word followed by a message, e.g. "    Building host image"
pub fn status(action: &str, message: &str) {
    eprintln!("{} {}", paint(BOLD_CYAN, &format!("{:>12}", action)), message);
}

pub fn success(message: &str) {
    eprintln!("  {} {}", paint(BOLD_GREEN, "\u{2713}"), message);
}

pub fn failure(message: &str) {
    eprintln!("  {} {}", paint(BOLD_RED, "\u{2717}"), message);
}

pub fn warning(message: &str) {
    eprintln!("  {} {}", paint(YELLOW, "!"), message);
}

pub fn info(message: &str) {
    eprintln!("  {} {}", paint(CYAN, "i"), message);
}

pub fn dim(message: &str) {
    eprintln!("{}", paint(DIM, message));
}

pub fn dim_success(message: &str) {
    eprintln!("{}", paint(GREEN, message));
}

pub fn dim_failure(message: &str) {
    eprintln!("{}", paint(RED, message));
}

/// One line of captured tool output, indented under the step that produced it
pub fn log_line(line: &str) {
    eprintln!("{}", paint(DIM, &format!("        | {}", line)));
}

/// "  Stage 2/3 'build' Building Firmware"
pub fn stage_header(index: usize, total: usize, name: &str, description: &str) {
    let label = format!("  Stage {}/{}", index, total);
    eprintln!("{} '{}' {}", paint(BOLD_BLUE, &label), name, description);
}

pub fn header(message: &str) {
    eprintln!("{}", paint(BOLD, &format!("==> {}", message)));
}
