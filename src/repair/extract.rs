//! Pulling candidate source out of free-form oracle text.

use regex::Regex;

/// Default fence matchers, highest priority first
const DEFAULT_FENCES: &[(&str, &str)] = &[
    ("cpp", r"(?is)```cpp\s*\n(.*?)\n```"),
    ("c++", r"(?s)```c\+\+\s*\n(.*?)\n```"),
    ("C++", r"(?s)```C\+\+\s*\n(.*?)\n```"),
    ("spaced-cpp", r"(?is)```\s*cpp\s*\n(.*?)\n```"),
    ("spaced-c++", r"(?is)```\s*c\+\+\s*\n(.*?)\n```"),
    ("bare", r"(?s)```\s*\n(.*?)\n```"),
    ("fixed-code", r"(?is)fixed code\s*[:：]\s*\n```[^`]*?\n(.*?)\n```"),
    ("complete-code", r"(?is)complete code\s*[:：]\s*\n```[^`]*?\n(.*?)\n```"),
];

/// Tokens that suggest text is C++ source
const DEFAULT_MARKERS: &[&str] = &[
    "#include",
    "int main",
    "using namespace",
    "std::",
    "cout",
    "cin",
    "vector",
    "string",
    "for",
    "while",
    "if",
    "return",
    "{",
    "}",
    ";",
];

/// Finds code blocks in oracle output
pub trait CodeMatcher: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate blocks in order of appearance
    fn find(&self, text: &str) -> Vec<String>;
}

/// Regex matcher whose first capture group is the code
#[derive(Debug, Clone)]
pub struct FencePattern {
    name: String,
    regex: Regex,
}

impl FencePattern {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(pattern)?,
        })
    }
}

impl CodeMatcher for FencePattern {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, text: &str) -> Vec<String> {
        self.regex
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .collect()
    }
}

/// Cheap "does this look like source code" check
#[derive(Debug, Clone)]
pub struct Plausibility {
    pub markers: Vec<String>,
    /// Distinct markers required
    pub threshold: usize,
    /// Minimum length in bytes
    pub min_len: usize,
}

impl Default for Plausibility {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKERS.iter().map(|m| m.to_string()).collect(),
            threshold: 3,
            min_len: 10,
        }
    }
}

impl Plausibility {
    pub fn is_plausible(&self, code: &str) -> bool {
        if code.len() < self.min_len {
            return false;
        }
        let found = self.markers.iter().filter(|m| code.contains(m.as_str())).count();
        found >= self.threshold
    }
}

/// Ordered matchers plus a plausibility gate
pub struct CodeExtractor {
    matchers: Vec<Box<dyn CodeMatcher>>,
    plausibility: Plausibility,
}

impl Default for CodeExtractor {
    fn default() -> Self {
        let matchers = DEFAULT_FENCES
            .iter()
            .filter_map(|(name, pattern)| match FencePattern::new(*name, pattern) {
                Ok(fence) => Some(Box::new(fence) as Box<dyn CodeMatcher>),
                Err(e) => {
                    log::error!("Invalid fence pattern {}: {}", name, e);
                    None
                }
            })
            .collect();
        Self::new(matchers, Plausibility::default())
    }
}

impl CodeExtractor {
    pub fn new(matchers: Vec<Box<dyn CodeMatcher>>, plausibility: Plausibility) -> Self {
        Self {
            matchers,
            plausibility,
        }
    }

    /// Append a lower-priority matcher
    pub fn with_matcher(mut self, matcher: Box<dyn CodeMatcher>) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// First plausible block, trying matchers in priority order
    pub fn extract(&self, text: &str) -> Option<String> {
        for matcher in &self.matchers {
            for block in matcher.find(text) {
                if self.plausibility.is_plausible(&block) {
                    log::debug!("Extracted {} bytes via {} matcher", block.len(), matcher.name());
                    return Some(block);
                }
            }
        }
        None
    }
}

impl std::fmt::Debug for CodeExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.matchers.iter().map(|m| m.name()).collect();
        f.debug_struct("CodeExtractor")
            .field("matchers", &names)
            .field("plausibility", &self.plausibility)
            .finish()
    }
}
