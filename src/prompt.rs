use std::fmt::Write as _;

use crate::config::AgentConfig;
use crate::training::TrainingData;
use crate::{ConciergeError, Result};

const MAX_EXAMPLES: usize = 5;
const MAX_CORRECTIONS: usize = 10;

const OUTPUT_CONTRACT: &str = r#"## RESPONSE FORMAT
Respond with a JSON object:
{
  "message": "Your response to the prospect",
  "collected_data": {"field": "value collected this turn"},
  "lead_status": "gathering_info|qualified|disqualified|meeting_requested|pending_confirmation",
  "qualification_score": 0-100,
  "qualification_notes": "Internal note",
  "suggested_quote_range": null or [min, max],
  "ready_to_book": false,
  "preferred_times": null or ["slot1", "slot2"]
}
"#;

pub fn compile(agent_id: &str, config: &AgentConfig, training: &TrainingData) -> Result<String> {
    if config.business.name.trim().is_empty() {
        return Err(ConciergeError::AgentNotFound(agent_id.to_string()));
    }

    let biz = &config.business;
    let owner_name = biz.owner_name.as_deref().unwrap_or(&biz.name);

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are the AI concierge for {}. {}",
        biz.name,
        biz.about.as_deref().unwrap_or("")
    );
    prompt.push('\n');

    prompt.push_str("## YOUR PERSONALITY\n");
    prompt.push_str(tone_block(biz.tone.as_deref()));
    prompt.push('\n');
    prompt.push_str(
        "Keep messages concise: 2-4 sentences per response unless explaining services in detail.\n\
         Ask ONE question at a time. Build naturally on the prospect's responses.\n\n",
    );

    let _ = writeln!(
        prompt,
        "## CONVERSATION FLOW\n\
         The prospect has just watched a personal video introduction from {owner_name}.\n\
         Your first message should warmly reference the video and transition into discovery.\n\
         \n\
         Flow:\n\
         1. Warm handoff from video, referencing {owner_name} and what they said\n\
         2. Ask what kind of event/project they're planning\n\
         3. Date and location\n\
         4. Guest count / scope\n\
         5. Which services interest them\n\
         6. Budget range (frame naturally)\n\
         7. If qualified: quote range + offer consultation\n\
         8. Collect contact info + preferred times\n\
         9. If not qualified: graceful redirect"
    );
    prompt.push('\n');

    prompt.push_str(&services_section(config));
    prompt.push_str(&pricing_section(config));
    prompt.push_str(&qualification_section(config));

    prompt.push_str(
        "## HANDLING DISQUALIFICATION\n\
         Never dismissive. Always:\n\
         1. Thank them genuinely\n\
         2. Acknowledge their event sounds wonderful\n\
         3. Be honest that premium services may not fit their current budget\n\
         4. Frame as wanting to deliver the full experience\n\
         5. Wish them well\n\n",
    );

    prompt.push_str(&booking_section(config, owner_name));
    prompt.push_str(&rules_section(training));
    prompt.push_str(&faq_section(training));
    prompt.push_str(&examples_section(training));
    prompt.push_str(&corrections_section(training));

    prompt.push_str(OUTPUT_CONTRACT);
    Ok(prompt)
}

fn tone_block(tone: Option<&str>) -> &'static str {
    match tone {
        Some("luxury") => {
            "You are warm, polished, and refined, like a luxury hospitality concierge. \
             Confident but never pushy. Premium but approachable."
        }
        Some("friendly") => {
            "You are upbeat, warm, and genuinely enthusiastic. \
             Like a helpful friend who happens to be an expert."
        }
        Some("casual") => {
            "You are relaxed, conversational, and approachable. \
             Keep things light and easy. No corporate-speak."
        }
        Some("warm") => {
            "You are caring, empathetic, and attentive. \
             You listen deeply and respond thoughtfully. Personal and genuine."
        }
        Some("bold") => {
            "You are confident, energetic, and memorable. \
             You make a strong impression. Dynamic and direct."
        }
        // "professional" and anything unrecognized.
        _ => {
            "You are professional, knowledgeable, and efficient. \
             Friendly but business-focused. Clear and direct."
        }
    }
}

fn services_section(config: &AgentConfig) -> String {
    if config.services.is_empty() {
        return String::new();
    }
    let mut out = String::from("## SERVICES OFFERED\n");
    for svc in &config.services {
        let _ = write!(out, "- **{}**", svc.name);
        if let Some(desc) = svc.description.as_deref().filter(|d| !d.is_empty()) {
            let _ = write!(out, ", {desc}");
        }
        if let Some(price) = svc.price_display.as_deref().filter(|p| !p.is_empty()) {
            let _ = write!(out, " (approximately {price})");
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

fn pricing_section(config: &AgentConfig) -> String {
    let pricing = &config.pricing;
    let mut out = String::from("## PRICING\n");
    let _ = writeln!(
        out,
        "Currency: {}",
        pricing.currency.as_deref().unwrap_or("CAD")
    );
    if let Some(rates) = &pricing.baseline_rates {
        let _ = writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(rates).unwrap_or_default()
        );
    }
    if let Some(ranges) = &pricing.event_type_ranges {
        let _ = writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(ranges).unwrap_or_default()
        );
    }
    out.push_str("\nAlways quote RANGES. Always say approximate. Final pricing after consultation.\n\n");
    out
}

fn qualification_section(config: &AgentConfig) -> String {
    let qual = &config.qualification;
    let mut out = String::from("## QUALIFICATION CRITERIA\n");

    // Per-event-type table beats the flat minimum when both are set.
    match &qual.minimum_budgets {
        Some(budgets) if !budgets.is_empty() => {
            out.push_str("Minimum budgets by event type:\n");
            for (event_type, amount) in budgets {
                let _ = writeln!(out, "- {}: {}", title_case(event_type), format_money(*amount));
            }
        }
        _ => {
            if let Some(minimum) = qual.minimum_budget {
                let _ = writeln!(out, "Minimum budget: {}", format_money(minimum));
            }
        }
    }

    if let Some(areas) = qual.service_areas.as_deref().filter(|a| !a.is_empty()) {
        let _ = writeln!(out, "Service areas: {}", areas.join(", "));
    }
    if let Some(days) = qual.advance_booking_days {
        let _ = writeln!(out, "Minimum advance booking: {days} days");
    }
    out.push('\n');
    out
}

fn booking_section(config: &AgentConfig, owner_name: &str) -> String {
    let booking = &config.booking;
    let mut out = String::from("## BOOKING FLOW\n");
    if config.booking_mode() == "auto_book" {
        out.push_str(
            "When a lead is qualified and interested, check calendar availability and book directly.\n",
        );
    } else {
        let days = booking
            .available_days
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| d.join(", "))
            .unwrap_or_else(|| "weekdays".to_string());
        let (start, end) = booking
            .available_hours
            .as_ref()
            .map(|h| (h.start.as_str(), h.end.as_str()))
            .unwrap_or(("10:00", "18:00"));
        let timezone = booking.timezone.as_deref().unwrap_or("ET");
        let _ = writeln!(
            out,
            "When a lead is qualified and interested:\n\
             1. Express genuine excitement about working together\n\
             2. Collect name, email, and optionally phone if not already provided\n\
             3. Ask for 2-3 preferred consultation time slots\n\
             4. Available: {days} {start}-{end} {timezone}\n\
             5. Explain that {owner_name} will personally confirm within 24 hours\n\
             6. Do NOT confirm a specific time yourself"
        );
    }
    out.push('\n');
    out
}

fn rules_section(training: &TrainingData) -> String {
    if training.rules.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## CUSTOM BUSINESS RULES\n\
         The business owner has specified these rules. Follow them precisely:\n",
    );
    for rule in &training.rules {
        let _ = writeln!(out, "- {}", rule.rule);
    }
    out.push('\n');
    out
}

fn faq_section(training: &TrainingData) -> String {
    if training.faq.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## FREQUENTLY ASKED QUESTIONS\n\
         When prospects ask these questions, use these owner-approved answers:\n\n",
    );
    for item in &training.faq {
        let _ = writeln!(out, "Q: {}\nA: {}\n", item.question, item.answer);
    }
    out
}

fn examples_section(training: &TrainingData) -> String {
    if training.examples.is_empty() {
        return String::new();
    }
    let mut out = String::from("## EXAMPLE INTERACTIONS (follow these patterns)\n");
    for example in training.examples.iter().take(MAX_EXAMPLES) {
        let _ = writeln!(out, "Scenario: {}", example.scenario);
        let _ = writeln!(out, "Good response: {}", example.good_response);
        if let Some(bad) = example.bad_response.as_deref().filter(|b| !b.is_empty()) {
            let _ = writeln!(out, "Avoid: {bad}");
        }
        out.push('\n');
    }
    out
}

fn corrections_section(training: &TrainingData) -> String {
    if training.corrections.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## CORRECTIONS FROM OWNER\n\
         The business owner has corrected these specific behaviors. Adjust accordingly:\n",
    );
    let skip = training.corrections.len().saturating_sub(MAX_CORRECTIONS);
    for correction in training.corrections.iter().skip(skip) {
        let _ = writeln!(out, "- When: {}", correction.situation);
        let wrong = if correction.wrong.is_empty() {
            "N/A"
        } else {
            correction.wrong.as_str()
        };
        let _ = writeln!(out, "  Instead of: {wrong}");
        let _ = writeln!(out, "  Do this: {}\n", correction.correction);
    }
    out
}

pub fn format_money(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}")
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn token_estimate(prompt: &str) -> f64 {
    prompt.split_whitespace().count() as f64 * 1.3
}
