//! The two-flag CLI surface from spec.md §6: `-inN` / `-outN`, any order,
//! value immediately adjacent to the flag (no space, no `=`).
//!
//! This shape doesn't fit `clap`'s `--flag value` / `--flag=value`
//! conventions, so it's a small hand-rolled scan over the argument list
//! rather than a dependency (see DESIGN.md).

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub input_port: Option<usize>,
    pub output_port: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("unrecognized argument: {0}")]
    Unrecognized(String),
    #[error("invalid port number in argument: {0}")]
    InvalidPortNumber(String),
}

impl CliArgs {
    /// Parse `args` (excluding argv[0]). Accepts `-inN` and `-outN` in
    /// either order; at most one of each.
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result = CliArgs::default();

        for arg in args {
            let arg = arg.as_ref();
            if let Some(rest) = arg.strip_prefix("-in") {
                let port: usize = rest
                    .parse()
                    .map_err(|_| CliError::InvalidPortNumber(arg.to_string()))?;
                result.input_port = Some(port);
            } else if let Some(rest) = arg.strip_prefix("-out") {
                let port: usize = rest
                    .parse()
                    .map_err(|_| CliError::InvalidPortNumber(arg.to_string()))?;
                result.output_port = Some(port);
            } else {
                return Err(CliError::Unrecognized(arg.to_string()));
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_flags_in_order() {
        let args = CliArgs::parse(["-in0", "-out1"]).unwrap();
        assert_eq!(args.input_port, Some(0));
        assert_eq!(args.output_port, Some(1));
    }

    #[test]
    fn parses_flags_in_reverse_order() {
        let args = CliArgs::parse(["-out2", "-in3"]).unwrap();
        assert_eq!(args.input_port, Some(3));
        assert_eq!(args.output_port, Some(2));
    }

    #[test]
    fn defaults_when_absent() {
        let args = CliArgs::parse(Vec::<&str>::new()).unwrap();
        assert_eq!(args.input_port, None);
        assert_eq!(args.output_port, None);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(CliArgs::parse(["-foo1"]).is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(CliArgs::parse(["-inX"]).is_err());
    }
}
