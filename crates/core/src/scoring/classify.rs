#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSignal {
    Upgrade,
    Downgrade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingSignal {
    Buy,
    Sell,
    Hold,
}

/// Maps free-form feed vocabulary onto the signals the scorer counts. Text that matches
/// nothing returns `None` and does not contribute.
pub trait SignalClassifier: Send + Sync {
    fn classify_action(&self, action: &str) -> Option<ActionSignal>;

    fn classify_rating(&self, rating: &str) -> Option<RatingSignal>;
}

/// Case-insensitive substring matching. Families are tested in a fixed order (upgrade
/// before downgrade, buy before sell before hold) and the first hit wins.
#[derive(Debug, Clone)]
pub struct SubstringClassifier {
    upgrade: Vec<String>,
    downgrade: Vec<String>,
    buy: Vec<String>,
    sell: Vec<String>,
    hold: Vec<String>,
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self {
            upgrade: terms(&["upgrade"]),
            downgrade: terms(&["downgrade"]),
            buy: terms(&["buy", "outperform", "strong buy"]),
            sell: terms(&["sell", "underperform", "strong sell"]),
            hold: terms(&["hold", "neutral"]),
        }
    }
}

impl SubstringClassifier {
    pub fn with_buy_terms(mut self, extra: &[&str]) -> Self {
        self.buy.extend(terms(extra));
        self
    }

    pub fn with_sell_terms(mut self, extra: &[&str]) -> Self {
        self.sell.extend(terms(extra));
        self
    }

    pub fn with_hold_terms(mut self, extra: &[&str]) -> Self {
        self.hold.extend(terms(extra));
        self
    }
}

impl SignalClassifier for SubstringClassifier {
    fn classify_action(&self, action: &str) -> Option<ActionSignal> {
        let action = action.to_lowercase();
        if contains_any(&action, &self.upgrade) {
            Some(ActionSignal::Upgrade)
        } else if contains_any(&action, &self.downgrade) {
            Some(ActionSignal::Downgrade)
        } else {
            None
        }
    }

    fn classify_rating(&self, rating: &str) -> Option<RatingSignal> {
        let rating = rating.to_lowercase();
        if contains_any(&rating, &self.buy) {
            Some(RatingSignal::Buy)
        } else if contains_any(&rating, &self.sell) {
            Some(RatingSignal::Sell)
        } else if contains_any(&rating, &self.hold) {
            Some(RatingSignal::Hold)
        } else {
            None
        }
    }
}

fn terms(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_lowercase()).collect()
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}
