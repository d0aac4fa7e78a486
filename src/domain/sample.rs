//! Sample and problem-context types supplied by the caller.

use serde::{Deserialize, Serialize};

/// One input / expected-output pair used for verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Text fed to the program's standard input
    pub input: String,

    /// Text the program is expected to print
    #[serde(alias = "output")]
    pub expected_output: String,
}

impl Sample {
    /// Create a new sample
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// Optional problem information passed through to the repair oracle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProblemContext {
    /// Problem statement
    pub description: Option<String>,

    /// Input format section
    pub input_format: Option<String>,

    /// Output format section
    pub output_format: Option<String>,

    /// Algorithm keywords, most relevant first
    pub keywords: Vec<String>,

    /// Free-form background knowledge
    pub notes: Option<String>,

    /// The problem's published samples, shown to the oracle ahead of failures
    pub samples: Vec<Sample>,
}

impl ProblemContext {
    /// Returns true if no field carries information
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.input_format.is_none()
            && self.output_format.is_none()
            && self.keywords.is_empty()
            && self.notes.is_none()
            && self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_new() {
        let sample = Sample::new("3\n1 2 3", "1 2 3");
        assert_eq!(sample.input, "3\n1 2 3");
        assert_eq!(sample.expected_output, "1 2 3");
    }

    #[test]
    fn test_sample_accepts_output_alias() {
        let yaml = "input: \"1 2\"\noutput: \"3\"\n";
        let sample: Sample = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sample.expected_output, "3");
    }

    #[test]
    fn test_sample_list_from_json() {
        let json = r#"[{"input": "1", "expected_output": "2"}, {"input": "3", "output": "4"}]"#;
        let samples: Vec<Sample> = serde_json::from_str(json).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], Sample::new("3", "4"));
    }

    #[test]
    fn test_problem_context_is_empty() {
        assert!(ProblemContext::default().is_empty());
        let ctx = ProblemContext {
            keywords: vec!["dp".to_string()],
            ..Default::default()
        };
        assert!(!ctx.is_empty());

        let ctx = ProblemContext {
            samples: vec![Sample::new("1", "1")],
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
