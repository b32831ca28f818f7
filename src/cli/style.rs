use anstyle::{AnsiColor, Effects, Style};

/// Colors for report output, all plain when color is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Styles {
    pub header: Style,
    pub placeholder: Style,
    pub old: Style,
    pub success: Style,
    pub error: Style,
}

impl Styles {
    pub fn new(color: bool) -> Self {
        if !color {
            return Self::default();
        }
        Self {
            header: Style::new().effects(Effects::BOLD | Effects::UNDERLINE),
            placeholder: AnsiColor::BrightBlack.on_default(),
            old: AnsiColor::Yellow.on_default(),
            success: AnsiColor::Green.on_default(),
            error: AnsiColor::Red.on_default().effects(Effects::BOLD),
        }
    }
}
