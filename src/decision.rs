//! The decision engine: symbolic rules over the classifier's soft output.
//!
//! This is a pure function of the judgment — no clock, no configuration, no
//! I/O — so the safety-critical gate is unit-testable without any external
//! call. A service is accepted only when the classifier judged the situation
//! severe AND is confident enough; anything weaker falls through to the
//! conversational path.

use crate::models::{ClassificationJudgment, EmergencyIntent, Language, Severity};

/// A type is accepted only at this confidence or above.
pub const CONFIDENCE_FLOOR: f64 = 0.70;

/// Convert a judgment into zero or more dispatch intents.
///
/// One intent per accepted service, each carrying the judgment's shared
/// confidence and the message language. When several services pass the
/// gate, intents come back sorted by priority (ambulance, fire, police) —
/// that ordering affects reporting only, dispatch is always concurrent.
pub fn decide(judgment: &ClassificationJudgment, language: Language) -> Vec<EmergencyIntent> {
    if !judgment.is_emergency
        || judgment.severity != Severity::Severe
        || judgment.confidence < CONFIDENCE_FLOOR
    {
        return Vec::new();
    }

    let mut intents: Vec<EmergencyIntent> = judgment
        .services
        .iter()
        .map(|&service| EmergencyIntent {
            service,
            priority: service.priority(),
            confidence: judgment.confidence,
            language,
        })
        .collect();

    intents.sort_by_key(|i| i.priority);
    intents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ServiceKind;

    fn judgment(
        is_emergency: bool,
        severity: Severity,
        services: &[ServiceKind],
        confidence: f64,
    ) -> ClassificationJudgment {
        ClassificationJudgment {
            is_emergency,
            severity,
            services: services.to_vec(),
            confidence,
            reasoning: String::new(),
        }
    }

    #[test]
    fn severe_confident_police_yields_one_intent() {
        let intents = decide(
            &judgment(true, Severity::Severe, &[ServiceKind::Police], 0.85),
            Language::En,
        );
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].service, ServiceKind::Police);
        assert_eq!(intents[0].confidence, 0.85);
    }

    #[test]
    fn multi_emergency_ordered_ambulance_before_fire() {
        let intents = decide(
            &judgment(
                true,
                Severity::Severe,
                &[ServiceKind::Fire, ServiceKind::Ambulance],
                0.91,
            ),
            Language::En,
        );
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].service, ServiceKind::Ambulance);
        assert_eq!(intents[1].service, ServiceKind::Fire);
        assert!(intents[0].priority < intents[1].priority);
    }

    #[test]
    fn moderate_severity_blocks_even_at_high_confidence() {
        let intents = decide(
            &judgment(true, Severity::Moderate, &[ServiceKind::Police], 0.95),
            Language::En,
        );
        assert!(intents.is_empty());
    }

    #[test]
    fn confidence_below_floor_blocks() {
        let intents = decide(
            &judgment(true, Severity::Severe, &[ServiceKind::Fire], 0.69),
            Language::En,
        );
        assert!(intents.is_empty());
    }

    #[test]
    fn confidence_at_floor_passes() {
        let intents = decide(
            &judgment(true, Severity::Severe, &[ServiceKind::Fire], 0.70),
            Language::En,
        );
        assert_eq!(intents.len(), 1);
    }

    #[test]
    fn non_emergency_yields_nothing() {
        let intents = decide(
            &judgment(false, Severity::None, &[], 0.99),
            Language::En,
        );
        assert!(intents.is_empty());
    }

    #[test]
    fn language_carried_into_intents() {
        let intents = decide(
            &judgment(true, Severity::Severe, &[ServiceKind::Ambulance], 0.9),
            Language::Si,
        );
        assert_eq!(intents[0].language, Language::Si);
    }

    /// The gate quantified over the severity × confidence grid: no service
    /// may ever pass unless severity is severe and confidence clears the
    /// floor, and whenever both hold every judged service passes.
    #[test]
    fn gate_holds_over_the_judgment_grid() {
        let severities = [
            Severity::None,
            Severity::Minor,
            Severity::Moderate,
            Severity::Severe,
        ];
        for severity in severities {
            for step in 0..=20 {
                let confidence = step as f64 * 0.05;
                let j = judgment(
                    true,
                    severity,
                    &[ServiceKind::Police, ServiceKind::Ambulance],
                    confidence,
                );
                let intents = decide(&j, Language::En);
                let should_pass =
                    severity == Severity::Severe && confidence >= CONFIDENCE_FLOOR;
                if should_pass {
                    assert_eq!(intents.len(), 2, "severity {:?} conf {}", severity, confidence);
                } else {
                    assert!(
                        intents.is_empty(),
                        "severity {:?} conf {} must not dispatch",
                        severity,
                        confidence
                    );
                }
            }
        }
    }

    #[test]
    fn same_judgment_same_intents() {
        let j = judgment(
            true,
            Severity::Severe,
            &[ServiceKind::Fire, ServiceKind::Police],
            0.8,
        );
        assert_eq!(decide(&j, Language::Ta), decide(&j, Language::Ta));
    }
}
