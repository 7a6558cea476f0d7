use serde_json::{json, Value};

const BEACH_KEYWORDS: &[&str] = &["beach", "playa"];
const MOUNTAIN_KEYWORDS: &[&str] = &["mountain", "montaña", "montana"];
const CITY_KEYWORDS: &[&str] = &["city", "ciudad"];

/// Instruction sent to the language model. The reply shape matches what
/// [`crate::extraction::extract`] reads first.
pub fn travel_prompt(user_message: &str) -> String {
    let quoted = Value::String(user_message.to_string());
    format!(
        r#"You are an expert travel assistant. The user asks: {quoted}

Answer in a friendly tone and recommend 2-3 specific destinations.
IMPORTANT: your answer must follow EXACTLY this JSON format:

{{
  "text": "Your friendly answer here",
  "locations": [
    {{"name": "City, Country"}},
    {{"name": "City, Country"}}
  ]
}}

Example:
{{
  "text": "Great choice! For beaches I recommend these options:",
  "locations": [
    {{"name": "Cancún, México"}},
    {{"name": "Maldivas"}},
    {{"name": "Bali, Indonesia"}}
  ]
}}

Reply ONLY with the JSON, no extra text."#
    )
}

/// Offline stand-in for the language model, keyed on simple keywords.
pub fn canned_reply(user_message: &str) -> String {
    let lowered = user_message.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    let reply = if mentions(BEACH_KEYWORDS) {
        payload(
            "Te recomiendo Costa Brava (España), Algarve (Portugal) y las playas de Albania.",
            &["Costa Brava, España", "Algarve, Portugal", "Albania"],
        )
    } else if mentions(MOUNTAIN_KEYWORDS) {
        payload(
            "Te sugiero los Alpes Suizos, los Pirineos y los Dolomitas en Italia.",
            &["Alpes Suizos", "Pirineos", "Dolomitas, Italia"],
        )
    } else if mentions(CITY_KEYWORDS) {
        payload(
            "Para ciudades te recomiendo Barcelona, Lisboa y Ámsterdam.",
            &[
                "Barcelona, España",
                "Lisboa, Portugal",
                "Ámsterdam, Países Bajos",
            ],
        )
    } else {
        payload(
            "¿Qué tipo de destino buscas? Puedo ayudarte con playa, montaña o ciudad.",
            &[],
        )
    };
    reply.to_string()
}

fn payload(text: &str, names: &[&str]) -> Value {
    let locations = names
        .iter()
        .map(|name| json!({ "name": name }))
        .collect::<Vec<_>>();
    json!({ "text": text, "locations": locations })
}
