//! Declarative lab-test definition table.
//!
//! Single source of truth: array order = extraction order = display order.
//! To add a new test, add one entry with { key, name, pattern }.

/// One extractable lab value: stable key, display name, detection pattern.
/// The pattern matches the test label as printed in the report; the value
/// token precedes the label in source text.
#[derive(Debug, Clone, Copy)]
pub struct TestDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub pattern: &'static str,
}

pub const TEST_DEFINITIONS: &[TestDefinition] = &[
    TestDefinition { key: "FERITINA", name: "Feritina", pattern: r"Feritina" },
    TestDefinition { key: "TSB", name: "Bilirubina totală", pattern: r"Bilirubin[ăa]?\s+total[ăa]?" },
    TestDefinition { key: "DBIL", name: "Bilirubina directă", pattern: r"Bilirubin[ăa]?\s+direct[ăa]?" },
    TestDefinition { key: "IBIL", name: "Bilirubina indirectă", pattern: r"Bilirubin[ăa]?\s+indirect[ăa]?" },
    TestDefinition { key: "B12", name: "Vitamina B12", pattern: r"Vitamina\s+B12" },
    TestDefinition { key: "25OHD", name: "25-OH Vitamina D", pattern: r"25-OH\s+Vitamina\s+D" },
    TestDefinition { key: "HBA1C", name: "Hemoglobina glicozilată (HbA1c)", pattern: r"Hemoglobina glicozilata\s*\(HbA1c\)" },
    TestDefinition { key: "MG", name: "Magneziu seric", pattern: r"Magneziu seric" },
    TestDefinition { key: "CA", name: "Calciu seric total", pattern: r"Calciu seric total" },
    TestDefinition { key: "K", name: "Potasiu seric", pattern: r"Potasiu seric" },
    TestDefinition { key: "IRON", name: "Sideremie", pattern: r"Sideremie" },
    TestDefinition { key: "Glu", name: "Glicemie", pattern: r"(Glicemie|Glucoz[ăa]\s+seric[ăa]?)" },
    TestDefinition { key: "TSH", name: "TSH", pattern: r"TSH" },
    TestDefinition { key: "FT4", name: "FT4", pattern: r"FT4" },
    TestDefinition { key: "FT3", name: "FT3", pattern: r"FT3" },
    TestDefinition { key: "CALCITONIN", name: "Calcitonina", pattern: r"Calcitonin[ăa]?" },
    TestDefinition { key: "PTH", name: "Intact PTH (Parathormon)", pattern: r"Intact\s+PTH(\s*\(Parathormon\))?" },
    TestDefinition { key: "ATPO", name: "Anti-TPO (Anti-tiroidperoxidaza)", pattern: r"Anti[-\s]?TPO(\s*\(Anti[-\s]?tiroidperoxidaz[ăa]\))?" },
    TestDefinition { key: "ACHCV", name: "Anticorpi anti-HCV", pattern: r"Anticorpi\s+anti[-\s]?HCV" },
    TestDefinition { key: "AGHBS", name: "Antigen HBs", pattern: r"Antigen\s+HBs" },
    TestDefinition { key: "PSA", name: "PSA", pattern: r"PSA" },
    TestDefinition { key: "VSH", name: "VSH", pattern: r"VSH" },
    TestDefinition { key: "CA199", name: "CA 19-9", pattern: r"CA\s*19[-\s]?9" },
    TestDefinition { key: "CA125", name: "CA 125", pattern: r"CA\s*125" },
    TestDefinition { key: "HOMOCYSTEIN", name: "Homocisteina", pattern: r"Homocistein[ăa]?" },
    TestDefinition { key: "hsCRP", name: "Proteina C Reactivă HS", pattern: r"Protein[ăa]?\s+C\s+[Rr]eactiv[ăa]?\s+HS" },
    TestDefinition { key: "CRP", name: "Proteina C reactivă (CRP)", pattern: r"Protein[ăa]?\s+C\s+[Rr]eactiv[ăa]?,?\s+cantitativ\s*\(CRP\)" },
    TestDefinition { key: "INR", name: "INR", pattern: r"INR" },
    TestDefinition { key: "APTT", name: "APTT", pattern: r"APTT" },
    TestDefinition { key: "HOMA", name: "Indice HOMA", pattern: r"(Indice\s+HOMA|HOMA)" },
    TestDefinition { key: "INS", name: "Insulina", pattern: r"Insulin[ăa]?" },
    TestDefinition { key: "d-dimeri", name: "D-Dimeri", pattern: r"D[\s-]?Dimer[i]?" },
    TestDefinition { key: "na", name: "Sodiu seric", pattern: r"Sodiu(\s+seric)?" },
    TestDefinition { key: "estradiol", name: "Estradiol", pattern: r"Estradiol" },
    TestDefinition { key: "prolactin", name: "Prolactina", pattern: r"Prolactin[ăa]?" },
    TestDefinition { key: "peptid-c", name: "Peptid C", pattern: r"Peptid(ul)?\s*C" },
];

/// Position of a key in the definition table, used for display/export order.
/// Keys produced by the fallback extractor are not in the table and sort last.
pub fn definition_rank(key: &str) -> Option<usize> {
    TEST_DEFINITIONS.iter().position(|d| d.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique() {
        let mut seen = HashSet::new();
        for def in TEST_DEFINITIONS {
            assert!(seen.insert(def.key), "duplicate test key: {}", def.key);
        }
    }

    #[test]
    fn patterns_all_compile() {
        for def in TEST_DEFINITIONS {
            assert!(
                regex::Regex::new(def.pattern).is_ok(),
                "pattern for {} does not compile",
                def.key
            );
        }
    }

    #[test]
    fn rank_follows_declaration_order() {
        assert_eq!(definition_rank("FERITINA"), Some(0));
        assert_eq!(definition_rank("TSB"), Some(1));
        assert_eq!(definition_rank("peptid-c"), Some(TEST_DEFINITIONS.len() - 1));
        assert_eq!(definition_rank("NOT_A_TEST"), None);
    }
}
