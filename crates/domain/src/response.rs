//! Pure function mapping `(event_kind, personality, locale, context)` to a
//! rendered template (§4.6). No I/O.

use crate::entities::{CelebrationStyle, Personality};

/// The fixed milestone set at which a celebration event is emitted (§4.6,
/// §8).
pub const MILESTONES: &[u32] = &[3, 7, 14, 30, 60, 90, 180, 365];

pub fn is_milestone(streak: u32) -> bool {
    MILESTONES.contains(&streak)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Checkin,
    CheckinWithStreak,
    Celebration,
    Struggle,
}

#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub tracker_name: String,
    pub streak: u32,
    pub milestone: Option<u32>,
    pub consecutive_misses: u32,
    pub greeting: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEvent {
    pub text: String,
    pub voice_id: String,
    pub emotion: String,
}

/// Strips bracketed (`[...]`) and angle-bracketed (`<...>`) voice-synthesis
/// markers, for the text channel's post-processor (§4.6). The original
/// accountability scheduler does this inline with two regexes on every
/// outgoing string; here it is a standalone, independently tested function.
pub fn strip_voice_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == ']' {
                        break;
                    }
                }
            }
            '<' => {
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == '>' {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn voice_for(personality: Personality) -> &'static str {
    match personality {
        Personality::Gentle => "voice.gentle",
        Personality::Supportive => "voice.supportive",
        Personality::Direct => "voice.direct",
        Personality::Assertive => "voice.assertive",
        Personality::ToughLove => "voice.tough_love",
    }
}

fn base_template(kind: EventKind, personality: Personality, ctx: &ResponseContext) -> (String, &'static str) {
    match kind {
        EventKind::Checkin => (
            format!("{} Time to check in on \"{}\".", ctx.greeting, ctx.tracker_name),
            "neutral",
        ),
        EventKind::CheckinWithStreak => (
            format!(
                "{} \"{}\" — you're on a {}-day streak. Keep it going!",
                ctx.greeting, ctx.tracker_name, ctx.streak
            ),
            "encouraging",
        ),
        EventKind::Celebration => (
            format!(
                "[excited]{} days of \"{}\"![/excited] <cheer> That's a milestone!",
                ctx.milestone.unwrap_or(ctx.streak),
                ctx.tracker_name
            ),
            "cheerful",
        ),
        EventKind::Struggle => (
            match personality {
                Personality::Gentle => format!(
                    "It's been {} days since your last check-in on \"{}\". No pressure — want to pick it back up?",
                    ctx.consecutive_misses, ctx.tracker_name
                ),
                Personality::ToughLove => format!(
                    "{} days without a check-in on \"{}\". You said this mattered to you.",
                    ctx.consecutive_misses, ctx.tracker_name
                ),
                _ => format!(
                    "\"{}\" has gone {} days without a check-in.",
                    ctx.tracker_name, ctx.consecutive_misses
                ),
            },
            "concerned",
        ),
    }
}

/// Adjusts celebration enthusiasm by `celebration_style`: `quiet` strips
/// emojis and exclamation marks; `enthusiastic` appends an extra intensity
/// marker; `moderate` leaves the template as rendered (§4.6).
fn apply_celebration_style(text: String, style: CelebrationStyle) -> String {
    match style {
        CelebrationStyle::Moderate => text,
        CelebrationStyle::Quiet => text
            .chars()
            .filter(|c| c.is_ascii() && *c != '!')
            .collect(),
        CelebrationStyle::Enthusiastic => format!("{text} <intensity:high>"),
    }
}

pub fn generate(
    event_kind: EventKind,
    personality: Personality,
    celebration_style: CelebrationStyle,
    _locale: &str,
    context: &ResponseContext,
) -> RenderedEvent {
    let (mut text, emotion) = base_template(event_kind, personality, context);

    if event_kind == EventKind::Celebration {
        text = apply_celebration_style(text, celebration_style);
    }

    RenderedEvent {
        text,
        voice_id: voice_for(personality).to_string(),
        emotion: emotion.to_string(),
    }
}
