pub const TITLE_CHAR_LIMIT: usize = 1023;

const CALENDAR_PROMPT: &str = "Remove any personally identifiable information and do not mention dates. Each event is a special one that deserves to share the spotlight with the other elements of the scene we are setting.";

const PROMPT_MARKERS: [&str; 2] = ["**Image Prompt:**\n\n", "**Prompt:** "];

/// How the day is described to the prompt writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayContext {
    pub today: String,
    pub newslist: String,
}

impl DayContext {
    /// `today` without the instruction tail, for logs.
    pub fn headline(&self) -> &str {
        self.today.split(';').next().unwrap_or(&self.today)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn describe_day(
    date: &str,
    holiday: Option<&str>,
    silly_day: Option<&str>,
    news: Option<&str>,
) -> DayContext {
    let the_day = match (non_empty(holiday), non_empty(silly_day)) {
        (Some(holiday), Some(silly_day)) => Some(format!("{holiday} and {silly_day}")),
        (Some(holiday), None) => Some(holiday.to_string()),
        (None, Some(silly_day)) => Some(silly_day.to_string()),
        (None, None) => None,
    };

    let today = match the_day {
        Some(the_day) => format!("{date}, {the_day}; ranked in order of importance"),
        None => format!("{date}; approximate the seasonal feel in the United States"),
    };

    let newslist = match non_empty(news) {
        Some(news) => format!(
            "events, holidays-- and particularly engrossed in the breaking news story \"{news}\""
        ),
        None => "events and holidays".to_string(),
    };

    DayContext { today, newslist }
}

/// Instructions for the text model that writes the image prompt.
pub fn build_generation_prompt(style: &str, day: &DayContext, always_include: &str) -> String {
    let mut lines = vec![
        format!(
            "You are an expert prompt creator for AI image generation. You specialize in creating images based on current {}.",
            day.newslist
        ),
        format!(
            "You incorporate the pure embodiment of the style of {style} into your creations-- you take it to the extreme. Really push your limits for organic, creative, and clever imagery."
        ),
        "You are exceptionally clever and inventive by hiding allegories in details.".to_string(),
        "A user could look at one of your creations several times and discover something new, insightful, or hilarious on each repeated viewing.".to_string(),
    ];
    let always_include = always_include.trim();
    if !always_include.is_empty() {
        lines.push(always_include.to_string());
    }
    lines.extend([
        format!("Today is {}.", day.today),
        "Craft a prompt for a scene that incorporates all of these elements together into a spectacular work of art.".to_string(),
        "Use the full screen, no margins.".to_string(),
        "IMPORTANT: Respond with the prompt only.".to_string(),
    ]);
    lines.join("\n")
}

pub fn append_calendar_events(prompt: &str, events: &[String]) -> String {
    if events.is_empty() {
        return prompt.to_string();
    }
    let mut extended = format!("{}\nToday also has some key events: ", prompt);
    for event in events {
        extended.push_str(event);
        extended.push_str("; ");
    }
    extended.push('\n');
    extended.push_str(CALENDAR_PROMPT);
    extended
}

/// Text sent to the image model for both orientations.
pub fn image_prompt(style: &str, prompt: &str) -> String {
    format!("{style}, no margins, full screen. {prompt}")
}

/// Undoes escaping and strips the labels models like to prepend.
pub fn clean_prompt(text: &str) -> String {
    let mut cleaned = text.replace("\\n", "\n").replace("\\\"", "\"");
    for marker in PROMPT_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.trim().trim_matches('"').trim().to_string()
}

/// Caps `text` at `limit` chars, preferring to cut after the last full sentence.
///
/// A closing quote is appended whenever the text is cut.
pub fn trim_prompt(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let window: String = text.chars().take(limit + 1).collect();
    match window.rfind('.') {
        Some(last_period) => format!("{}\"", &window[..=last_period]),
        None => {
            let head: String = text.chars().take(limit).collect();
            format!("{head}\"")
        }
    }
}
