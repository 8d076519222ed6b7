//! External pricing program
//!
//! Invoked as `program [args…] price vol strike samples rate months type` and
//! expected to print the three-line curve format on stdout.

use super::{parse_curve, Curve, PricingError, PricingInput, PricingModel};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubprocessPricer {
    pub program: PathBuf,
    /// Leading arguments, e.g. the script for an interpreter
    #[serde(default)]
    pub args: Vec<String>,
}

impl SubprocessPricer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn input_args(input: &PricingInput) -> [String; 7] {
        [
            input.price.to_string(),
            input.volatility.to_string(),
            input.strike.to_string(),
            input.samples.to_string(),
            input.risk_free_rate.to_string(),
            input.months_to_expiry.to_string(),
            input.option_type.as_str().to_string(),
        ]
    }
}

impl PricingModel for SubprocessPricer {
    fn curve(&self, input: &PricingInput, scale: u32) -> Result<Curve, PricingError> {
        input.validate()?;
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(Self::input_args(input))
            .output()?;

        if !output.status.success() {
            return Err(PricingError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| PricingError::Malformed("output is not UTF-8".to_string()))?;
        debug!(program = %self.program.display(), bytes = stdout.len(), "pricing model returned");
        parse_curve(&stdout, scale)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::OptionType;

    fn input() -> PricingInput {
        PricingInput {
            price: 2000.0,
            volatility: 0.5,
            strike: 2000.0,
            samples: 10,
            risk_free_rate: 0.01,
            months_to_expiry: 2.0,
            option_type: OptionType::Put,
        }
    }

    #[test]
    fn test_reads_curve_from_stdout() {
        let pricer = SubprocessPricer::new("sh").with_args(["-c", "printf '1,2\\n10,11\\n9,8\\n'", "pricer"]);
        let curve = pricer.curve(&input(), 2).unwrap();
        assert_eq!(curve.x.len(), 2);
        assert_eq!(curve.sell[1].raw(), 800);
    }

    #[test]
    fn test_passes_inputs_in_order() {
        // echo the 7th positional argument (option type) as a one-point curve
        let pricer = SubprocessPricer::new("sh").with_args([
            "-c",
            "test \"$7\" = put && printf '1\\n2\\n3\\n'",
            "pricer",
        ]);
        assert!(pricer.curve(&input(), 0).is_ok());
    }

    #[test]
    fn test_failing_program_is_an_error() {
        let pricer = SubprocessPricer::new("sh").with_args(["-c", "exit 3", "pricer"]);
        assert!(matches!(
            pricer.curve(&input(), 2),
            Err(PricingError::Failed { .. })
        ));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let pricer = SubprocessPricer::new("/definitely/not/a/pricer");
        assert!(matches!(pricer.curve(&input(), 2), Err(PricingError::Spawn(_))));
    }
}
