//! TwiML voice-response construction.
//!
//! Typed Say/Gather verbs rendered to the XML the telephony provider
//! executes. Text is always XML-escaped before it lands in the document.

/// One spoken phrase with its TTS locale.
#[derive(Debug, Clone)]
pub struct Say {
    pub language: &'static str,
    pub text: String,
}

impl Say {
    pub fn new(language: &'static str, text: impl Into<String>) -> Self {
        Self {
            language,
            text: text.into(),
        }
    }
}

/// A single-keypress gather: speaks its prompts, then posts the digit to
/// the action URL. On timeout the provider falls through to the verbs after
/// the gather without posting.
#[derive(Debug, Clone)]
pub struct Gather {
    pub action: String,
    pub timeout_secs: u16,
    pub prompts: Vec<Say>,
}

#[derive(Debug, Clone)]
enum Verb {
    Say(Say),
    Gather(Gather),
}

/// Ordered verbs of one `<Response>` document.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn render(&self) -> String {
        let mut xml = String::from("<Response>");
        for verb in &self.verbs {
            match verb {
                Verb::Say(say) => render_say(&mut xml, say),
                Verb::Gather(gather) => {
                    xml.push_str(&format!(
                        "<Gather numDigits=\"1\" action=\"{}\" method=\"POST\" timeout=\"{}\">",
                        escape_xml(&gather.action),
                        gather.timeout_secs
                    ));
                    for say in &gather.prompts {
                        render_say(&mut xml, say);
                    }
                    xml.push_str("</Gather>");
                }
            }
        }
        xml.push_str("</Response>");
        xml
    }
}

fn render_say(xml: &mut String, say: &Say) {
    xml.push_str(&format!(
        "<Say language=\"{}\">{}</Say>",
        say.language,
        escape_xml(&say.text)
    ));
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
