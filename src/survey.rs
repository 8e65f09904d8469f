//! The fixed survey asked in every report cycle

pub const DEFAULT_GREETING: &str = "It's time for your weather report!";
pub const DEFAULT_FINISH_MESSAGE: &str = "That's all for today!";
pub const DEFAULT_RESULTS_HEADING: &str = "Here are the results of today's weather report";
pub const DEFAULT_QUESTIONS: [&str; 3] = [
    "What's the weather looking like?",
    "How are your tasks going?",
    "Do you need help with your tasks?",
];

/// Messages and questions for one survey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Questionnaire {
    pub greeting: String,
    pub questions: Vec<String>,
    pub finish_message: String,
    /// Root message of the shared results thread
    pub results_heading: String,
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            questions: DEFAULT_QUESTIONS.iter().map(ToString::to_string).collect(),
            finish_message: DEFAULT_FINISH_MESSAGE.to_string(),
            results_heading: DEFAULT_RESULTS_HEADING.to_string(),
        }
    }
}

impl Questionnaire {
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, index: usize) -> Option<&str> {
        self.questions.get(index).map(String::as_str)
    }

    /// Render answers as a bold-question / answer transcript, in question order.
    pub fn transcript(&self, answers: &[String]) -> String {
        self.questions
            .iter()
            .zip(answers)
            .map(|(question, answer)| format!("*{question}*\n{answer}\n"))
            .collect()
    }
}
