use concierge::config::{AgentConfig, AvailableHours, Booking, Qualification, ServiceOffering};
use concierge::prompt::compile;
use concierge::training::{Correction, FaqItem, Rule, TrainingData, TrainingExample};
use concierge::ConciergeError;
use indexmap::IndexMap;

fn base_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.business.name = "Vamos Events".to_string();
    config.business.about = Some("Luxury event planning in the GTA.".to_string());
    config.business.owner_name = Some("Maria".to_string());
    config
}

#[test]
fn manual_booking_uses_six_step_handoff_with_defaults() {
    let config = base_config();
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();

    assert!(prompt.contains("## BOOKING FLOW"));
    assert!(prompt.contains("1. Express genuine excitement about working together"));
    assert!(prompt.contains("6. Do NOT confirm a specific time yourself"));
    assert!(prompt.contains("4. Available: weekdays 10:00-18:00 ET"));
    assert!(prompt.contains("5. Explain that Maria will personally confirm within 24 hours"));
    assert!(!prompt.contains("book directly"));
}

#[test]
fn auto_book_mode_replaces_the_handoff() {
    let mut config = base_config();
    config.booking.mode = Some("auto_book".to_string());
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();

    assert!(prompt.contains("check calendar availability and book directly"));
    assert!(!prompt.contains("Do NOT confirm a specific time yourself"));
}

#[test]
fn configured_booking_window_overrides_defaults() {
    let mut config = base_config();
    config.booking = Booking {
        mode: None,
        available_days: Some(vec!["Tuesday".to_string(), "Thursday".to_string()]),
        available_hours: Some(AvailableHours {
            start: "09:00".to_string(),
            end: "14:00".to_string(),
        }),
        timezone: Some("PT".to_string()),
    };
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.contains("4. Available: Tuesday, Thursday 09:00-14:00 PT"));
}

#[test]
fn budget_table_beats_flat_minimum() {
    let mut config = base_config();
    config.qualification = Qualification {
        minimum_budget: Some(2000),
        minimum_budgets: Some(IndexMap::from([
            ("wedding".to_string(), 5000u64),
            ("corporate".to_string(), 3000u64),
        ])),
        service_areas: Some(vec!["Toronto".to_string(), "Mississauga".to_string()]),
        advance_booking_days: Some(14),
    };
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();

    assert!(prompt.contains("Minimum budgets by event type:"));
    assert!(prompt.contains("- Wedding: $5,000"));
    assert!(prompt.contains("- Corporate: $3,000"));
    assert!(!prompt.contains("Minimum budget: $2,000"));
    assert!(prompt.contains("Service areas: Toronto, Mississauga"));
    assert!(prompt.contains("Minimum advance booking: 14 days"));

    // Declared order survives rendering.
    let wedding = prompt.find("- Wedding").unwrap();
    let corporate = prompt.find("- Corporate").unwrap();
    assert!(wedding < corporate);
}

#[test]
fn flat_minimum_renders_when_no_table() {
    let mut config = base_config();
    config.qualification.minimum_budget = Some(2000);
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.contains("Minimum budget: $2,000"));
    assert!(!prompt.contains("Minimum budgets by event type:"));
}

#[test]
fn no_budget_config_renders_no_budget_lines() {
    let config = base_config();
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(!prompt.contains("Minimum budget"));
}

#[test]
fn services_render_in_declared_order_or_not_at_all() {
    let mut config = base_config();
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(!prompt.contains("## SERVICES OFFERED"));

    config.services = vec![
        ServiceOffering {
            name: "Full planning".to_string(),
            description: Some("End to end coordination".to_string()),
            price_display: Some("$8,000+".to_string()),
        },
        ServiceOffering {
            name: "Day-of coordination".to_string(),
            description: None,
            price_display: None,
        },
    ];
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.contains("## SERVICES OFFERED"));
    assert!(prompt.contains("- **Full planning**, End to end coordination (approximately $8,000+)"));
    let first = prompt.find("- **Full planning**").unwrap();
    let second = prompt.find("- **Day-of coordination**").unwrap();
    assert!(first < second);
}

#[test]
fn unknown_tone_falls_back_to_professional() {
    let mut config = base_config();
    config.business.tone = Some("sassy".to_string());
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.contains("professional, knowledgeable, and efficient"));

    config.business.tone = Some("luxury".to_string());
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.contains("luxury hospitality concierge"));
}

#[test]
fn examples_cap_at_five_and_corrections_keep_last_ten() {
    let config = base_config();
    let mut training = TrainingData::default();
    for i in 0..7 {
        training.examples.push(TrainingExample {
            scenario: format!("scenario {i}"),
            good_response: format!("response {i}"),
            bad_response: None,
            added_at: None,
        });
    }
    for i in 0..12 {
        training.corrections.push(Correction {
            situation: format!("situation {i}"),
            wrong: String::new(),
            correction: format!("fix {i}"),
            added_at: None,
        });
    }

    let prompt = compile("vamos-events", &config, &training).unwrap();
    assert!(prompt.contains("Scenario: scenario 4"));
    assert!(!prompt.contains("Scenario: scenario 5"));
    assert!(!prompt.contains("When: situation 0"));
    assert!(!prompt.contains("When: situation 1"));
    assert!(prompt.contains("When: situation 2"));
    assert!(prompt.contains("When: situation 11"));
    assert!(prompt.contains("Instead of: N/A"));
}

#[test]
fn rules_and_faq_sections_render_only_when_present() {
    let config = base_config();
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(!prompt.contains("## CUSTOM BUSINESS RULES"));
    assert!(!prompt.contains("## FREQUENTLY ASKED QUESTIONS"));

    let mut training = TrainingData::default();
    training.rules.push(Rule {
        rule: "Never quote hourly rates".to_string(),
        added_at: None,
    });
    training.faq.push(FaqItem {
        question: "Do you travel?".to_string(),
        answer: "Yes, anywhere in Ontario.".to_string(),
        added_at: None,
    });
    let prompt = compile("vamos-events", &config, &training).unwrap();
    assert!(prompt.contains("- Never quote hourly rates"));
    assert!(prompt.contains("Q: Do you travel?\nA: Yes, anywhere in Ontario."));
}

#[test]
fn output_contract_is_always_the_tail() {
    let config = base_config();
    let prompt = compile("vamos-events", &config, &TrainingData::default()).unwrap();
    assert!(prompt.trim_end().ends_with('}'));
    assert!(prompt.contains("## RESPONSE FORMAT"));
    assert!(prompt.contains("\"suggested_quote_range\": null or [min, max]"));
}

#[test]
fn compilation_is_deterministic() {
    let mut config = base_config();
    config.qualification.minimum_budgets = Some(IndexMap::from([
        ("wedding".to_string(), 5000u64),
        ("birthday".to_string(), 1500u64),
    ]));
    let mut training = TrainingData::default();
    training.rules.push(Rule {
        rule: "Always ask for the date".to_string(),
        added_at: None,
    });

    let first = compile("vamos-events", &config, &training).unwrap();
    let second = compile("vamos-events", &config, &training).unwrap();
    assert_eq!(first, second);
}

#[test]
fn empty_business_name_is_agent_not_found() {
    let config = AgentConfig::default();
    let err = compile("ghost", &config, &TrainingData::default()).unwrap_err();
    assert!(matches!(err, ConciergeError::AgentNotFound(id) if id == "ghost"));
}
