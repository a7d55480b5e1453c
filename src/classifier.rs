use crate::models::Permit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade/service taxonomy leads are sold under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeTag {
    Electrical,
    Plumbing,
    #[serde(rename = "HVAC")]
    Hvac,
    Roofing,
    Pool,
    Solar,
    Painting,
    Flooring,
    #[serde(rename = "Windows & Doors")]
    WindowsAndDoors,
    #[serde(rename = "General Construction")]
    GeneralConstruction,
    #[serde(rename = "Home Services")]
    HomeServices,
}

impl TradeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeTag::Electrical => "Electrical",
            TradeTag::Plumbing => "Plumbing",
            TradeTag::Hvac => "HVAC",
            TradeTag::Roofing => "Roofing",
            TradeTag::Pool => "Pool",
            TradeTag::Solar => "Solar",
            TradeTag::Painting => "Painting",
            TradeTag::Flooring => "Flooring",
            TradeTag::WindowsAndDoors => "Windows & Doors",
            TradeTag::GeneralConstruction => "General Construction",
            TradeTag::HomeServices => "Home Services",
        }
    }
}

impl fmt::Display for TradeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checked top to bottom, first hit wins. Short keywords like "air" also match
/// inside other words ("repair"), so moving a rule changes results.
const RULES: &[(&[&str], TradeTag)] = &[
    (&["electric"], TradeTag::Electrical),
    (&["plumb"], TradeTag::Plumbing),
    (
        &["hvac", "mech", "air", "heating", "cooling"],
        TradeTag::Hvac,
    ),
    (&["roof"], TradeTag::Roofing),
    (&["pool"], TradeTag::Pool),
    (&["solar"], TradeTag::Solar),
    (&["paint"], TradeTag::Painting),
    (&["floor"], TradeTag::Flooring),
    (&["window", "door"], TradeTag::WindowsAndDoors),
    (&["building", "residential"], TradeTag::GeneralConstruction),
];

/// Maps free text (work description, permit type) to a trade tag.
pub fn classify(text: &str) -> TradeTag {
    let text = text.to_lowercase();

    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, tag)| *tag)
        .unwrap_or(TradeTag::HomeServices)
}

/// Classifies a permit from its work description and permit type together.
pub fn classify_permit(permit: &Permit) -> TradeTag {
    let text = [
        permit.work_description.as_deref(),
        permit.permit_type.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    classify(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_keyword_rules() {
        assert_eq!(classify("Upgrade ELECTRICAL panel"), TradeTag::Electrical);
        assert_eq!(classify("replace plumbing fixtures"), TradeTag::Plumbing);
        assert_eq!(classify("New HVAC unit"), TradeTag::Hvac);
        assert_eq!(classify("Mechanical permit"), TradeTag::Hvac);
        assert_eq!(classify("Tear off and reroof"), TradeTag::Roofing);
        assert_eq!(classify("In-ground swimming pool"), TradeTag::Pool);
        assert_eq!(classify("Rooftop solar PV"), TradeTag::Roofing);
        assert_eq!(classify("solar pv install"), TradeTag::Solar);
        assert_eq!(classify("exterior paint"), TradeTag::Painting);
        assert_eq!(classify("hardwood flooring"), TradeTag::Flooring);
        assert_eq!(classify("replace 6 windows"), TradeTag::WindowsAndDoors);
        assert_eq!(classify("New residential"), TradeTag::GeneralConstruction);
    }

    #[test]
    fn test_default_tag() {
        assert_eq!(classify(""), TradeTag::HomeServices);
        assert_eq!(classify("fence"), TradeTag::HomeServices);
    }

    #[test]
    fn test_first_rule_wins() {
        // hvac is checked before roof
        assert_eq!(classify("roof replacement and hvac"), TradeTag::Hvac);
        // "repair" contains "air"
        assert_eq!(classify("roof repair"), TradeTag::Hvac);
        assert_eq!(classify("electrical for pool"), TradeTag::Electrical);
        assert_eq!(classify("residential window replacement"), TradeTag::WindowsAndDoors);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_value(TradeTag::WindowsAndDoors).unwrap(),
            serde_json::json!("Windows & Doors")
        );
        assert_eq!(TradeTag::Hvac.to_string(), "HVAC");
    }
}
