use serde::{Deserialize, Serialize};

/// Broad area of the official exam notice, each with a fixed share of the questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicArea {
    GeneralLanguage,
    QuantitativeReasoning,
    GeneralKnowledge,
    DomainSpecific,
}

impl TopicArea {
    pub const ALL: [TopicArea; 4] = [
        TopicArea::GeneralLanguage,
        TopicArea::QuantitativeReasoning,
        TopicArea::GeneralKnowledge,
        TopicArea::DomainSpecific,
    ];

    /// Share of a full mock exam, in percent. The four shares add up to 100.
    #[must_use]
    pub fn weight_percent(self) -> u32 {
        match self {
            TopicArea::GeneralLanguage => 25,
            TopicArea::QuantitativeReasoning => 15,
            TopicArea::GeneralKnowledge => 10,
            TopicArea::DomainSpecific => 50,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TopicArea::GeneralLanguage => "Português",
            TopicArea::QuantitativeReasoning => "Matemática/RL",
            TopicArea::GeneralKnowledge => "Gerais",
            TopicArea::DomainSpecific => "Específicos",
        }
    }

    /// Split `count` questions across the areas by largest remainder.
    ///
    /// The result is in `TopicArea::ALL` order and always sums to `count`.
    #[must_use]
    pub fn distribute(count: u32) -> Vec<(TopicArea, u32)> {
        let total = u64::from(count);
        let mut parts: Vec<(TopicArea, u32, u64)> = TopicArea::ALL
            .into_iter()
            .map(|area| {
                let scaled = total * u64::from(area.weight_percent());
                let whole = u32::try_from(scaled / 100).unwrap_or(u32::MAX);
                (area, whole, scaled % 100)
            })
            .collect();

        let assigned: u32 = parts.iter().map(|(_, whole, _)| *whole).sum();
        let mut leftover = count.saturating_sub(assigned);

        let mut order: Vec<usize> = (0..parts.len()).collect();
        // Stable sort keeps declaration order on ties.
        order.sort_by(|a, b| parts[*b].2.cmp(&parts[*a].2));
        for idx in order {
            if leftover == 0 {
                break;
            }
            parts[idx].1 += 1;
            leftover -= 1;
        }

        parts.into_iter().map(|(area, n, _)| (area, n)).collect()
    }
}

/// A subject of the official syllabus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub name: &'static str,
    pub area: TopicArea,
}

pub const SUBJECTS: [Subject; 7] = [
    Subject {
        name: "Português",
        area: TopicArea::GeneralLanguage,
    },
    Subject {
        name: "Matemática e RL",
        area: TopicArea::QuantitativeReasoning,
    },
    Subject {
        name: "Conhecimentos Gerais",
        area: TopicArea::GeneralKnowledge,
    },
    Subject {
        name: "Física Radiológica",
        area: TopicArea::DomainSpecific,
    },
    Subject {
        name: "Proteção Radiológica",
        area: TopicArea::DomainSpecific,
    },
    Subject {
        name: "Anatomia Radiológica",
        area: TopicArea::DomainSpecific,
    },
    Subject {
        name: "Técnicas e Posicionamentos",
        area: TopicArea::DomainSpecific,
    },
];

/// Subject pairs that are usually examined together.
pub const COMPLEMENTARY_PAIRS: [(&str, &str); 3] = [
    ("Anatomia Radiológica", "Técnicas e Posicionamentos"),
    ("Física Radiológica", "Proteção Radiológica"),
    ("Português", "Matemática e RL"),
];

/// Topics with the highest error rate, used for gap focus when there is no history yet.
pub const DEFAULT_GAP_TOPICS: [&str; 2] = ["Física Radiológica", "Legislação RDC 611/2022"];

/// Case-insensitive lookup in the official subject list.
#[must_use]
pub fn find_subject(name: &str) -> Option<Subject> {
    let needle = name.trim().to_lowercase();
    SUBJECTS
        .into_iter()
        .find(|s| s.name.to_lowercase() == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_hundred() {
        let total: u32 = TopicArea::ALL.iter().map(|a| a.weight_percent()).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn distribution_of_forty_matches_notice() {
        let split = TopicArea::distribute(40);
        assert_eq!(
            split,
            vec![
                (TopicArea::GeneralLanguage, 10),
                (TopicArea::QuantitativeReasoning, 6),
                (TopicArea::GeneralKnowledge, 4),
                (TopicArea::DomainSpecific, 20),
            ]
        );
    }

    #[test]
    fn distribution_always_sums_to_count() {
        for count in [0, 1, 7, 15, 20, 35, 99] {
            let sum: u32 = TopicArea::distribute(count).iter().map(|(_, n)| n).sum();
            assert_eq!(sum, count, "count {count}");
        }
    }

    #[test]
    fn subjects_are_found_case_insensitively() {
        let subject = find_subject("anatomia radiológica").unwrap();
        assert_eq!(subject.area, TopicArea::DomainSpecific);
        assert!(find_subject("Astrologia").is_none());
    }
}
