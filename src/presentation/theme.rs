use colored::Colorize;

pub struct Theme {
    pub title: fn(&str) -> String,
    pub provider: fn(&str) -> String,
    pub line: fn(&str) -> String,
    pub idx: fn(&str) -> String,
    pub quality: fn(&str) -> String,
    pub source: fn(&str) -> String,
    pub target: fn(&str) -> String,
    pub context: fn(&str) -> String,
}

impl Theme {
    pub fn from_name(name: &str) -> Self {
        match name {
            "temp" | "" => Self::temp(),
            "wudao" => Self::wudao(),
            "canvas" => Self::canvas(),
            _ => {
                eprintln!("{}", format!("✘ Unknown theme: {}", name).red());
                Self::temp()
            }
        }
    }

    fn temp() -> Self {
        Self {
            title: |s| s.bright_magenta().italic().bold().underline().to_string(),
            provider: |s| s.cyan().to_string(),
            line: |s| s.bright_black().dimmed().to_string(),
            idx: |s| s.bright_white().to_string(),
            quality: |s| s.green().to_string(),
            source: |s| s.bright_white().dimmed().italic().to_string(),
            target: |s| s.yellow().to_string(),
            context: |s| s.cyan().italic().to_string(),
        }
    }

    fn wudao() -> Self {
        Self {
            title: |s| s.red().italic().bold().underline().to_string(),
            provider: |s| s.green().italic().to_string(),
            line: |s| s.bright_black().dimmed().to_string(),
            idx: |s| s.bright_white().to_string(),
            quality: |s| s.cyan().to_string(),
            source: |s| s.bright_yellow().dimmed().italic().to_string(),
            target: |s| s.bright_white().to_string(),
            context: |s| s.red().italic().to_string(),
        }
    }

    fn canvas() -> Self {
        Self {
            title: |s| s.blue().bold().underline().to_string(),
            provider: |s| s.bright_blue().to_string(),
            line: |s| s.bright_black().dimmed().to_string(),
            idx: |s| s.cyan().to_string(),
            quality: |s| s.magenta().to_string(),
            source: |s| s.bright_black().italic().to_string(),
            target: |s| s.black().to_string(),
            context: |s| s.green().italic().to_string(),
        }
    }
}
