/// Syntax of the rendered configuration loaded into the candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DataFormat {
    /// `set ...` commands
    #[default]
    Set,
    /// Curly-brace configuration text
    Text,
    /// `<configuration>` XML
    Xml,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Set => "set",
            DataFormat::Text => "text",
            DataFormat::Xml => "xml",
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
