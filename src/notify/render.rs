//! Markdown message bodies.

use crate::model::{Match, NotificationKind, Side, Sport};
use std::fmt::Write;

pub fn render(m: &Match, kind: NotificationKind) -> String {
    match kind {
        NotificationKind::MatchStart => match_start(m),
        NotificationKind::HalftimeTrailing => halftime_trailing(m),
    }
}

/// Escape the characters legacy Telegram Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '[' | ']' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn sport_emoji(sport: Sport) -> &'static str {
    match sport {
        Sport::Tennis => "🎾",
        Sport::Basketball => "🏀",
        Sport::Handball => "🤾",
    }
}

fn sport_title(sport: Sport) -> &'static str {
    match sport {
        Sport::Tennis => "Tennis",
        Sport::Basketball => "Basketball",
        Sport::Handball => "Handball",
    }
}

struct Names {
    home: String,
    away: String,
    league: String,
}

impl Names {
    fn of(m: &Match) -> Self {
        Self {
            home: escape_markdown(&m.home_team),
            away: escape_markdown(&m.away_team),
            league: escape_markdown(&m.league_name),
        }
    }

    fn side(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }
}

fn match_start(m: &Match) -> String {
    let names = Names::of(m);
    let mut text = String::new();

    // Writing into a String cannot fail.
    let _ = write!(
        text,
        "{} *MATCH STARTING SOON*\n\n*{} vs {}*\nLeague: {}\nSport: {}\n\n*Pre-match Odds:*\n• {}: {:.2}\n• {}: {:.2}\n",
        sport_emoji(m.sport),
        names.home,
        names.away,
        names.league,
        sport_title(m.sport),
        names.home,
        m.pre_match_home_odds,
        names.away,
        m.pre_match_away_odds,
    );
    if let Some(draw) = m.pre_match_draw_odds {
        let _ = writeln!(text, "• Draw: {:.2}", draw);
    }
    let _ = write!(text, "\n*Favorite:* {}", names.side(m.pre_match_favorite));
    text
}

fn halftime_trailing(m: &Match) -> String {
    let names = Names::of(m);
    let period = if m.sport == Sport::Tennis { "FIRST SET" } else { "HALFTIME" };
    let mut text = String::new();

    let _ = write!(
        text,
        "🚨 *FAVORITE TRAILING AT {}* 🚨\n\n{} *{} vs {}*\nLeague: {}\n\n*Current Score:*\n{}: {}\n{}: {}\n\n*Pre-match Favorite:* {}\n*Pre-match Odds:* {:.2}\n\n*Current Live Odds:*\n",
        period,
        sport_emoji(m.sport),
        names.home,
        names.away,
        names.league,
        names.home,
        m.current_score_home,
        names.away,
        m.current_score_away,
        names.side(m.pre_match_favorite),
        m.favorite_pre_match_odds(),
    );
    for (label, odds) in [
        (names.home.as_str(), m.halftime_home_odds),
        (names.away.as_str(), m.halftime_away_odds),
    ] {
        match odds {
            Some(odds) => {
                let _ = writeln!(text, "• {}: {:.2}", label, odds);
            }
            None => {
                let _ = writeln!(text, "• {}: n/a", label);
            }
        }
    }
    if let Some(draw) = m.halftime_draw_odds {
        let _ = writeln!(text, "• Draw: {:.2}", draw);
    }
    text.push_str("\n💡 The favorite is now trailing - potential value opportunity!");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::scheduled_match;
    use chrono::Utc;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_markdown("A_B [x] *y* `z`"), "A\\_B \\[x\\] \\*y\\* \\`z\\`");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn match_start_lists_odds_and_favorite() {
        let mut m = scheduled_match("1", Sport::Handball, Utc::now());
        m.home_team = "Kiel_II".to_string();
        m.pre_match_draw_odds = Some(9.5);
        let text = render(&m, NotificationKind::MatchStart);

        assert!(text.contains("MATCH STARTING SOON"));
        assert!(text.contains("Kiel\\_II vs Away"));
        assert!(text.contains("• Kiel\\_II: 1.50"));
        assert!(text.contains("• Draw: 9.50"));
        assert!(text.ends_with("*Favorite:* Kiel\\_II"));
    }

    #[test]
    fn halftime_period_label_depends_on_sport() {
        let mut tennis = scheduled_match("2", Sport::Tennis, Utc::now());
        tennis.current_score_away = 1;
        tennis.halftime_home_odds = Some(2.75);
        let text = render(&tennis, NotificationKind::HalftimeTrailing);
        assert!(text.contains("FAVORITE TRAILING AT FIRST SET"));
        assert!(text.contains("*Pre-match Odds:* 1.50"));
        assert!(text.contains("• Home: 2.75"));
        assert!(text.contains("• Away: n/a"));

        let basketball = scheduled_match("3", Sport::Basketball, Utc::now());
        let text = render(&basketball, NotificationKind::HalftimeTrailing);
        assert!(text.contains("FAVORITE TRAILING AT HALFTIME"));
    }
}
