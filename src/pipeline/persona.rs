//! Persona classification
//!
//! Picks the system instruction for a message by case-insensitive keyword
//! search. Rules are checked in configuration order; the first rule with any
//! keyword in the text wins, otherwise the default persona applies.

use aho_corasick::AhoCorasick;

use crate::config::PersonasConfig;
use crate::error::{AppError, AppResult};

/// Named system instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    pub name: String,
    pub instruction: String,
}

/// Ordered keyword rules plus a default persona
#[derive(Debug, Clone)]
pub struct PersonaRules {
    default: Persona,
    rules: Vec<Persona>,
    /// Owning rule index for each automaton pattern
    owners: Vec<usize>,
    automaton: Option<AhoCorasick>,
}

impl PersonaRules {
    /// Build rules from configuration
    ///
    /// # Errors
    /// Returns `AppError::Config` if the keyword automaton cannot be built
    pub fn from_config(config: &PersonasConfig) -> AppResult<Self> {
        let default = Persona {
            name: "default".to_string(),
            instruction: config.default.clone(),
        };
        let mut rules = Vec::with_capacity(config.rules.len());
        let mut keywords: Vec<String> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();

        for (index, rule) in config.rules.iter().enumerate() {
            rules.push(Persona {
                name: rule.name.clone(),
                instruction: rule.instruction.clone(),
            });
            for keyword in &rule.keywords {
                let keyword = keyword.trim().to_lowercase();
                if keyword.is_empty() {
                    continue;
                }
                keywords.push(keyword);
                owners.push(index);
            }
        }

        let automaton = if keywords.is_empty() {
            None
        } else {
            let ac = AhoCorasick::new(&keywords).map_err(|e| {
                AppError::Config(format!("failed to build persona keyword matcher: {}", e))
            })?;
            tracing::debug!(
                rules = rules.len(),
                keywords = keywords.len(),
                "Persona keyword matcher built"
            );
            Some(ac)
        };

        Ok(Self {
            default,
            rules,
            owners,
            automaton,
        })
    }

    /// Persona for `text`
    pub fn classify(&self, text: &str) -> &Persona {
        let Some(ac) = self.automaton.as_ref() else {
            return &self.default;
        };
        let lowered = text.to_lowercase();

        ac.find_overlapping_iter(&lowered)
            .map(|mat| self.owners[mat.pattern().as_usize()])
            .min()
            .and_then(|index| self.rules.get(index))
            .unwrap_or(&self.default)
    }
}
