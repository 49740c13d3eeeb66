//! 比赛标签模板与描述符

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder for a numeric slot inside a template shape.
pub const SLOT: char = '#';

/// Characters the label recognizer may emit: space, digits, and every
/// letter used by a template.
pub static LABEL_CHARSET: Lazy<String> = Lazy::new(|| {
    let letters: BTreeSet<char> = MatchTemplate::ALL
        .iter()
        .flat_map(|t| t.shape().chars())
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    let mut charset = String::from(" 0123456789");
    charset.extend(letters);
    charset
});

/// The closed set of overlay label shapes, in rank order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MatchTemplate {
    #[default]
    None,
    Test,
    Qualification,
    Quarterfinal,
    QuarterfinalTiebreaker,
    Semifinal,
    SemifinalSeries,
    Final,
}

impl MatchTemplate {
    pub const ALL: [MatchTemplate; 8] = [
        MatchTemplate::None,
        MatchTemplate::Test,
        MatchTemplate::Qualification,
        MatchTemplate::Quarterfinal,
        MatchTemplate::QuarterfinalTiebreaker,
        MatchTemplate::Semifinal,
        MatchTemplate::SemifinalSeries,
        MatchTemplate::Final,
    ];

    /// Label text with every number replaced by [`SLOT`].
    pub fn shape(&self) -> &'static str {
        match self {
            MatchTemplate::None => "",
            MatchTemplate::Test => "Test Match",
            MatchTemplate::Qualification => "Qualification # of #",
            MatchTemplate::Quarterfinal => "Quarterfinal # of #",
            MatchTemplate::QuarterfinalTiebreaker => "QuarterFinal Tiebreaker #",
            MatchTemplate::Semifinal => "Semifinal #",
            MatchTemplate::SemifinalSeries => "Semifinal # of #",
            MatchTemplate::Final => "Final #",
        }
    }

    pub fn slots(&self) -> usize {
        self.shape().chars().filter(|&c| c == SLOT).count()
    }

    /// Short code used in cache rows.
    pub fn code(&self) -> &'static str {
        match self {
            MatchTemplate::None => "-",
            MatchTemplate::Test => "T",
            MatchTemplate::Qualification => "Q",
            MatchTemplate::Quarterfinal => "QF",
            MatchTemplate::QuarterfinalTiebreaker => "QT",
            MatchTemplate::Semifinal => "SF",
            MatchTemplate::SemifinalSeries => "SO",
            MatchTemplate::Final => "F",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "-" => MatchTemplate::None,
            "T" => MatchTemplate::Test,
            "Q" => MatchTemplate::Qualification,
            "QF" => MatchTemplate::Quarterfinal,
            "QT" => MatchTemplate::QuarterfinalTiebreaker,
            "SF" => MatchTemplate::Semifinal,
            "SO" => MatchTemplate::SemifinalSeries,
            "F" => MatchTemplate::Final,
            _ => return None,
        })
    }

    /// Fill the slots in order; a missing value keeps its placeholder.
    pub fn render(&self, values: &[Option<u32>]) -> String {
        let mut values = values.iter();
        let mut out = String::with_capacity(self.shape().len() + 4);
        for c in self.shape().chars() {
            if c == SLOT {
                match values.next().copied().flatten() {
                    Some(v) => out.push_str(&v.to_string()),
                    None => out.push(SLOT),
                }
            } else {
                out.push(c);
            }
        }
        out
    }
}

/// Largest value a label slot can show (three digits).
pub const MAX_SLOT_VALUE: u32 = 999;

/// 解析后的比赛标签
///
/// Only descriptors the label decoder could produce can be built: every
/// slot the template has for `number` is filled, values fit in three
/// digits, and nothing is stored for a slot the template lacks. `total`
/// is dropped when it is below `number`. That keeps derived equality and
/// ordering in line with the rendered label.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "DescriptorFields")]
pub struct MatchDescriptor {
    template: MatchTemplate,
    number: Option<u32>,
    total: Option<u32>,
}

#[derive(Deserialize)]
struct DescriptorFields {
    template: MatchTemplate,
    number: Option<u32>,
    total: Option<u32>,
}

impl TryFrom<DescriptorFields> for MatchDescriptor {
    type Error = String;

    fn try_from(fields: DescriptorFields) -> Result<Self, Self::Error> {
        MatchDescriptor::new(fields.template, fields.number, fields.total).ok_or_else(|| {
            format!(
                "{:?} cannot hold number {:?} and total {:?}",
                fields.template, fields.number, fields.total
            )
        })
    }
}

impl MatchDescriptor {
    /// `None` when the values do not fit the template's slots.
    pub fn new(template: MatchTemplate, number: Option<u32>, total: Option<u32>) -> Option<Self> {
        let fits = |v: Option<u32>| v.map_or(true, |v| v <= MAX_SLOT_VALUE);
        let valid = match template.slots() {
            0 => number.is_none() && total.is_none(),
            1 => number.is_some() && fits(number) && total.is_none(),
            _ => number.is_some() && fits(number) && fits(total),
        };
        if !valid {
            return None;
        }

        let mut descriptor = Self {
            template,
            number,
            total: None,
        };
        descriptor.set_total(total);
        Some(descriptor)
    }

    /// The "no event" descriptor.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn template(&self) -> MatchTemplate {
        self.template
    }

    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn total(&self) -> Option<u32> {
        self.total
    }

    /// Overwrite `total`. A no-op for templates without a total slot; a
    /// value below `number` or over three digits clears it.
    pub fn set_total(&mut self, total: Option<u32>) {
        if self.template.slots() < 2 {
            return;
        }
        self.total = match (self.number, total) {
            (Some(n), Some(t)) if n > t || t > MAX_SLOT_VALUE => None,
            _ => total,
        };
    }

    pub fn is_empty(&self) -> bool {
        self.template == MatchTemplate::None
    }

    /// Canonical label text, also the grouping key for segmentation.
    pub fn identity(&self) -> String {
        self.template.render(&[self.number, self.total])
    }
}

impl fmt::Display for MatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}
