use ddmc::DdmcError;

#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    DataReading {
        source: String,
    },
    Write {
        source: String,
        path: String,
    },
    Clustering {
        source: DdmcError,
    },
}

impl CliError {
    pub fn io(source: impl std::fmt::Display, path: &std::path::Path) -> Self {
        CliError::Io {
            source: source.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        }
    }

    pub fn write(source: impl std::fmt::Display, path: &std::path::Path) -> Self {
        CliError::Write {
            source: source.to_string(),
            path: path.to_string_lossy().to_string(),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing config: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::DataReading { source } => write!(f, "Error reading data: {}", source),
            CliError::Write { source, path } => {
                write!(f, "Error writing file {}: {}", path, source)
            }
            CliError::Clustering { source } => write!(f, "Error clustering: {}", source),
        }
    }
}

impl From<DdmcError> for CliError {
    fn from(e: DdmcError) -> Self {
        CliError::Clustering { source: e }
    }
}

impl From<csv::Error> for CliError {
    fn from(e: csv::Error) -> Self {
        CliError::DataReading {
            source: e.to_string(),
        }
    }
}
