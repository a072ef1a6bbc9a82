//! Plain-text rendering of backend data for the terminal.

use std::fmt::Write as _;

use shared::protocol::{Filiere, LoginChallenge, SessionDetail};

const BAR_WIDTH: usize = 20;

pub fn match_bar(percentage: u8) -> String {
    let percentage = percentage.min(100);
    let filled = usize::from(percentage) * BAR_WIDTH / 100;
    format!(
        "[{}{}] {percentage:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled)
    )
}

fn bullet_list(out: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "   {title}:");
    for item in items {
        let _ = writeln!(out, "     - {item}");
    }
}

/// Recommendations in the order the backend ranked them. Descriptions and
/// advice are markdown and printed as received.
pub fn recommendations(filieres: &[Filiere], general_advice: Option<&str>) -> String {
    let mut out = String::new();
    if filieres.is_empty() {
        out.push_str("No recommendation was returned.\n");
    }
    for (rank, filiere) in filieres.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {}  {}",
            rank + 1,
            filiere.name,
            match_bar(filiere.match_percentage)
        );
        if !filiere.duration.is_empty() {
            let _ = writeln!(out, "   Duration: {}", filiere.duration);
        }
        for line in filiere.description.lines() {
            let _ = writeln!(out, "   {line}");
        }
        bullet_list(&mut out, "Career outlets", &filiere.outlets);
        bullet_list(&mut out, "Strengths", &filiere.strengths);
        bullet_list(&mut out, "Institutions", &filiere.institutions);
        out.push('\n');
    }
    if let Some(advice) = general_advice {
        out.push_str("General advice:\n");
        out.push_str(advice);
        if !advice.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

pub fn session_line(session: &SessionDetail) -> String {
    format!(
        "#{:<6} {:<4} {:<15} {}  {} question(s), {} recommendation(s)",
        session.id.to_string(),
        session.serie_bac.to_string(),
        session.status.to_string(),
        session.created_at.format("%Y-%m-%d %H:%M"),
        session.questions.len(),
        session.filieres_recommandees.len()
    )
}

/// Questions paired with the stored answers, then the recommendations.
pub fn session_detail(session: &SessionDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session #{} ({})", session.id, session.serie_bac.label());
    let _ = writeln!(
        out,
        "Status: {}  updated {}",
        session.status,
        session.updated_at.format("%Y-%m-%d %H:%M")
    );

    if !session.questions.is_empty() {
        out.push_str("\nQuestions:\n");
    }
    for question in &session.questions {
        let answer = session
            .reponses
            .iter()
            .find(|answer| answer.question_id == question.id)
            .map(|answer| answer.response.as_str())
            .unwrap_or("(no answer)");
        let _ = writeln!(out, "- {}\n  > {answer}", question.prompt);
    }

    if !session.filieres_recommandees.is_empty() {
        out.push_str("\nRecommendations:\n");
        out.push_str(&recommendations(&session.filieres_recommandees, None));
    }
    out
}

pub fn login_challenge(challenge: &LoginChallenge) -> String {
    let mut out = format!("{}\n", challenge.message);
    let Some(details) = &challenge.details else {
        return out;
    };
    let fields = [
        ("Location", join_known(&[&details.city, &details.country])),
        ("Browser", join_known(&[&details.browser, &details.os])),
        ("Time", details.time.clone()),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            let _ = writeln!(out, "  {label}: {value}");
        }
    }
    out
}

fn join_known(parts: &[&Option<String>]) -> Option<String> {
    let known: Vec<&str> = parts
        .iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.is_empty())
        .collect();
    (!known.is_empty()).then(|| known.join(", "))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use shared::{
        domain::{QuestionId, SerieBac, SessionId, SessionStatus},
        protocol::{AnswerPayload, LoginAttemptDetails, Question},
    };

    use super::*;

    fn filiere(name: &str, percentage: u8) -> Filiere {
        Filiere {
            name: name.into(),
            description: "Première ligne\n**Deuxième** ligne".into(),
            duration: "5 ans".into(),
            match_percentage: percentage,
            outlets: vec!["Ingénieur".into()],
            strengths: Vec::new(),
            institutions: Vec::new(),
        }
    }

    #[test]
    fn bar_is_proportional_and_clamped() {
        assert_eq!(match_bar(0), format!("[{}]   0%", "-".repeat(20)));
        assert_eq!(match_bar(50), format!("[{}{}]  50%", "#".repeat(10), "-".repeat(10)));
        assert_eq!(match_bar(250), format!("[{}] 100%", "#".repeat(20)));
    }

    #[test]
    fn recommendations_keep_backend_order_and_markdown() {
        let text = recommendations(
            &[filiere("Médecine", 95), filiere("Pharmacie", 80)],
            Some("Travaillez la **biologie**."),
        );
        let medecine = text.find("1. Médecine").expect("first");
        let pharmacie = text.find("2. Pharmacie").expect("second");
        assert!(medecine < pharmacie);
        assert!(text.contains("   **Deuxième** ligne\n"));
        assert!(text.contains("     - Ingénieur\n"));
        assert!(!text.contains("Strengths"));
        assert!(text.ends_with("General advice:\nTravaillez la **biologie**.\n"));
    }

    #[test]
    fn empty_recommendations_are_reported() {
        assert_eq!(
            recommendations(&[], None),
            "No recommendation was returned.\n"
        );
    }

    #[test]
    fn session_detail_pairs_questions_with_answers() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).single().expect("timestamp");
        let session = SessionDetail {
            id: SessionId(4),
            serie_bac: SerieBac::L,
            status: SessionStatus::QuestionsSent,
            questions: vec![
                Question {
                    id: QuestionId(1),
                    prompt: "Aimez-vous lire ?".into(),
                },
                Question {
                    id: QuestionId(2),
                    prompt: "Langues ?".into(),
                },
            ],
            reponses: vec![AnswerPayload {
                question_id: QuestionId(1),
                response: "Beaucoup".into(),
            }],
            filieres_recommandees: Vec::new(),
            created_at: at,
            updated_at: at,
        };

        let text = session_detail(&session);
        assert!(text.starts_with("Session #4 (Série L (Littéraire))\nStatus: questions sent"));
        assert!(text.contains("- Aimez-vous lire ?\n  > Beaucoup\n"));
        assert!(text.contains("- Langues ?\n  > (no answer)\n"));
        assert!(!text.contains("Recommendations"));
        assert!(session_line(&session).starts_with("#4      L    questions sent  2025-06-01 08:00"));
    }

    #[test]
    fn login_challenge_lists_known_details_only() {
        let text = login_challenge(&LoginChallenge {
            message: "Vérifiez votre email".into(),
            details: Some(LoginAttemptDetails {
                city: Some("Dakar".into()),
                country: Some("Sénégal".into()),
                browser: None,
                os: Some(String::new()),
                time: Some("10:42".into()),
            }),
        });
        assert_eq!(
            text,
            "Vérifiez votre email\n  Location: Dakar, Sénégal\n  Time: 10:42\n"
        );
    }
}
