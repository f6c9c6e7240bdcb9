//! Section taxonomy registry
//!
//! Static, ordered catalog of the report sections found in each export family.
//! Order matters: it is the index-sheet row order and the iteration order of the
//! merge engine. The tables are plain `'static` data and are never mutated, so
//! concurrent runs share them freely.

use anyhow::Result;
use std::collections::HashSet;

use crate::db::models::FileFamily;
use crate::error::ConsolidationError;

/// Excel's hard limit on worksheet names
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// One statutory report section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    /// Canonical key, also the sheet name looked up in each export
    pub key: &'static str,
    /// Human description of the section
    pub reference: &'static str,
    /// Statutory table number(s)
    pub table_ref: &'static str,
    /// Output sheet this section is written to; shared groups are merged
    pub output_group: &'static str,
    /// Column letter carrying the transaction date
    pub date_column: Option<&'static str>,
    /// Column letter carrying a per-row declared period
    pub period_column: Option<&'static str>,
    pub validation_required: bool,
}

impl SectionSpec {
    const fn plain(key: &'static str, reference: &'static str, table_ref: &'static str) -> Self {
        SectionSpec {
            key,
            reference,
            table_ref,
            output_group: key,
            date_column: None,
            period_column: None,
            validation_required: false,
        }
    }

    /// Whether rows of this section get a date-vs-period check
    pub fn validates_dates(&self) -> bool {
        self.validation_required && self.date_column.is_some()
    }
}

const B2B_SEZ_DE: &str = "Outward - b2b+sez+de";

static GSTR1_SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        key: "B2B",
        reference: "Taxable supplies made to registered taxpayers (invoices only) - B2B",
        table_ref: "4A, 4B, 4C, 6B, 6C",
        output_group: B2B_SEZ_DE,
        date_column: Some("D"),
        period_column: Some("R"),
        validation_required: true,
    },
    SectionSpec {
        key: "SEZ",
        reference: "Taxable supplies made to registered taxpayers (invoices only) - SEZ",
        table_ref: "4A, 4B, 4C, 6B, 6C",
        output_group: B2B_SEZ_DE,
        date_column: Some("D"),
        period_column: Some("R"),
        validation_required: true,
    },
    SectionSpec {
        key: "DE",
        reference: "Taxable supplies made to registered taxpayers (invoices only) - DE",
        table_ref: "4A, 4B, 4C, 6B, 6C",
        output_group: B2B_SEZ_DE,
        date_column: Some("D"),
        period_column: Some("R"),
        validation_required: true,
    },
    SectionSpec {
        key: "B2CL",
        reference: "Taxable outward inter-state supplies made to unregistered persons (where invoice value is more than Rs.2.5 lakh) - B2CL (Large)",
        table_ref: "5",
        output_group: "Out - b2cl",
        date_column: Some("A"),
        period_column: Some("I"),
        validation_required: true,
    },
    SectionSpec {
        key: "EXP",
        reference: "Exports",
        table_ref: "6A",
        output_group: "Out - exp",
        date_column: Some("C"),
        period_column: Some("O"),
        validation_required: true,
    },
    SectionSpec {
        output_group: "Out-b2cs",
        ..SectionSpec::plain(
            "B2CS",
            "Taxable supplies (Net of debit and credit notes) to unregistered persons (other than the supplies covered in Table 5) - B2CS (Others)",
            "7",
        )
    },
    SectionSpec {
        output_group: "Out - exemp",
        ..SectionSpec::plain("EXEMP", "Nil rated, exempted and non GST outward supplies", "8")
    },
    SectionSpec {
        output_group: "Out - b2ba",
        ..SectionSpec::plain(
            "B2BA",
            "Amendment to taxable outward supplies made to registered person in returns of earlier tax periods in table 4A, 4B, 6B, 6C - B2B",
            "9A",
        )
    },
    SectionSpec {
        output_group: "Out - b2cla",
        ..SectionSpec::plain(
            "B2CLA",
            "Amendment to Inter-State supplies made to unregistered person (where invoice value is more than Rs.2.5 lakh) in returns of earlier tax periods in table 5 - B2CL (Large)",
            "9B",
        )
    },
    SectionSpec {
        output_group: "Out - expa",
        ..SectionSpec::plain("EXPA", "Amendment to Export Supplies", "9C")
    },
    SectionSpec {
        key: "CDNR",
        reference: "Credit/ Debit notes issued to the registered taxpayers - CDNR",
        table_ref: "10",
        output_group: "Outward - cdnr",
        date_column: Some("D"),
        period_column: Some("S"),
        validation_required: true,
    },
    SectionSpec {
        key: "CDNUR",
        reference: "Credit/ Debit notes issued to the unregistered persons - CDNUR",
        table_ref: "11",
        output_group: "Out - cdnur",
        date_column: Some("C"),
        period_column: Some("N"),
        validation_required: true,
    },
    SectionSpec {
        output_group: "Out-cdnra",
        period_column: Some("R"),
        ..SectionSpec::plain(
            "CDNRA",
            "Amendment to Credit/ Debit notes issued to the registered taxpayers - CDNRA",
            "12A",
        )
    },
    SectionSpec {
        output_group: "Out-cdnura",
        period_column: Some("M"),
        ..SectionSpec::plain(
            "CDNURA",
            "Amendment to Credit/ Debit notes issued to the unregistered persons - CDNURA",
            "12B",
        )
    },
    SectionSpec {
        output_group: "Out-b2csa",
        period_column: Some("J"),
        ..SectionSpec::plain(
            "B2CSA",
            "Amendment to taxable outward supplies made to unregistered person in returns for earlier tax periods in table 7 - B2C (Others)",
            "12C",
        )
    },
    SectionSpec {
        output_group: "Out-at",
        period_column: Some("H"),
        ..SectionSpec::plain(
            "AT",
            "11A(1), 11A(2) - Advances received for which invoice has not been issued (tax amount to be added to the output tax liability) (Net of refund vouchers)",
            "11A(1), 11A(2)",
        )
    },
    SectionSpec {
        output_group: "Out-atadj",
        period_column: Some("H"),
        ..SectionSpec::plain(
            "ATADJ",
            "11B(1), 11B(2) - Advance amount received in earlier tax period and adjusted against the supplies being shown in this tax period in Table Nos. 4, 5, 6 and 7",
            "11B(1), 11B(2)",
        )
    },
    SectionSpec {
        output_group: "Out-ata",
        period_column: Some("J"),
        ..SectionSpec::plain(
            "ATA",
            "11A - Amendment to advances received in returns for earlier tax periods in table 11A(1), 11A(2)",
            "11A",
        )
    },
    SectionSpec {
        output_group: "Out-atadja",
        period_column: Some("J"),
        ..SectionSpec::plain(
            "ATADJA",
            "11B - Amendment to advances adjusted in returns for earlier tax periods in table 11B(1), 11B(2)",
            "11B",
        )
    },
    SectionSpec {
        output_group: "Out-hsn",
        period_column: Some("K"),
        ..SectionSpec::plain("HSN", "12 - HSN-wise summary of outward supplies", "12")
    },
    SectionSpec {
        output_group: "Out-docs",
        period_column: Some("F"),
        ..SectionSpec::plain("DOCS", "13 - Documents issued", "13")
    },
];

static GSTR2A_SECTIONS: &[SectionSpec] = &[
    SectionSpec::plain("B2B", "Taxable inward supplies received from registered person", "3"),
    SectionSpec::plain("B2BA", "Amendments to previously uploaded invoices by supplier", "4"),
    SectionSpec::plain("CDNR", "Debit/Credit notes(Original)", "5"),
    SectionSpec::plain(
        "CDNRA",
        "Amendments to previously uploaded Credit/Debit notes by supplier",
        "6",
    ),
    SectionSpec::plain(
        "ECO",
        "Documents reported by ECO on which ECO is liable to pay tax u/s 9(5)",
        "7",
    ),
    SectionSpec::plain(
        "ECOA",
        "Amendment to documents reported by ECO on which ECO is liable to pay tax u/s 9(5)",
        "8",
    ),
    SectionSpec::plain("ISD", "ISD Credit", "9"),
    SectionSpec::plain("ISDA", "Amendments to ISD Credits received", "10"),
    SectionSpec::plain("TDS", "TDS Credit received", "11"),
    SectionSpec::plain("TDSA", "Amendments to TDS Credit received", "12"),
    SectionSpec::plain(
        "TCS",
        "Details of supplies made through e-commerce operator (TCS)",
        "13",
    ),
    SectionSpec::plain(
        "TCSA",
        "Amendments to details of supplies in respect of any earlier statement (TCSA)",
        "14",
    ),
    SectionSpec::plain("IMPG", "Import of goods from overseas on bill of entry", "15"),
    SectionSpec::plain(
        "IMPGSEZ",
        "Import of goods from SEZ units/developers on bill of entry",
        "16",
    ),
];

/// Read-only view over one family's section catalog
#[derive(Debug, Clone, Copy)]
pub struct Taxonomy {
    family: FileFamily,
    sections: &'static [SectionSpec],
}

impl Taxonomy {
    pub fn for_family(family: FileFamily) -> Self {
        let sections = match family {
            FileFamily::A => GSTR1_SECTIONS,
            FileFamily::B => GSTR2A_SECTIONS,
        };
        Taxonomy { family, sections }
    }

    /// Build a taxonomy over a custom catalog
    pub fn from_sections(family: FileFamily, sections: &'static [SectionSpec]) -> Self {
        Taxonomy { family, sections }
    }

    pub fn family(&self) -> FileFamily {
        self.family
    }

    pub fn sections(&self) -> &'static [SectionSpec] {
        self.sections
    }

    pub fn get(&self, key: &str) -> Option<&'static SectionSpec> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn group_members<'a>(
        &'a self,
        group: &'a str,
    ) -> impl Iterator<Item = &'static SectionSpec> + 'a {
        self.sections.iter().filter(move |s| s.output_group == group)
    }

    /// A group fed by more than one section is emitted once, after all its members
    pub fn is_combined_group(&self, group: &str) -> bool {
        self.group_members(group).nth(1).is_some()
    }

    /// Title printed on every data sheet of this family
    pub fn title(&self) -> String {
        format!("Goods and Services Tax - Form {}", self.family.form_name())
    }

    /// Reject catalogs the engine cannot process faithfully
    pub fn validate(&self) -> Result<()> {
        let mut keys = HashSet::new();
        for spec in self.sections {
            if !keys.insert(spec.key) {
                return Err(ConsolidationError::Taxonomy(format!(
                    "duplicate section key '{}' in {}",
                    spec.key, self.family
                ))
                .into());
            }
            if spec.validation_required && spec.date_column.is_none() {
                return Err(ConsolidationError::Taxonomy(format!(
                    "section '{}' requires date validation but declares no date column",
                    spec.key
                ))
                .into());
            }
            if spec.output_group.trim().is_empty()
                || spec.output_group.chars().count() > MAX_SHEET_NAME_LEN
            {
                return Err(ConsolidationError::Taxonomy(format!(
                    "section '{}' has unusable output group '{}'",
                    spec.key, spec.output_group
                ))
                .into());
            }
            for column in [spec.date_column, spec.period_column].into_iter().flatten() {
                if crate::utils::column_index(column).is_none() {
                    return Err(ConsolidationError::Taxonomy(format!(
                        "section '{}' has invalid column locator '{}'",
                        spec.key, column
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalogs_are_valid() {
        for family in FileFamily::all() {
            Taxonomy::for_family(family).validate().unwrap();
        }
    }

    #[test]
    fn test_catalog_order_and_sizes() {
        let a = Taxonomy::for_family(FileFamily::A);
        let keys: Vec<_> = a.sections().iter().map(|s| s.key).collect();
        assert_eq!(keys.len(), 21);
        assert_eq!(&keys[..3], &["B2B", "SEZ", "DE"]);
        assert_eq!(keys.last(), Some(&"DOCS"));

        let b = Taxonomy::for_family(FileFamily::B);
        assert_eq!(b.sections().len(), 14);
        assert_eq!(b.sections()[0].key, "B2B");
        assert_eq!(b.sections()[13].key, "IMPGSEZ");
    }

    #[test]
    fn test_combined_group_detection() {
        let a = Taxonomy::for_family(FileFamily::A);
        assert!(a.is_combined_group("Outward - b2b+sez+de"));
        assert!(!a.is_combined_group("Out - b2cl"));
        let members: Vec<_> = a.group_members("Outward - b2b+sez+de").map(|s| s.key).collect();
        assert_eq!(members, vec!["B2B", "SEZ", "DE"]);

        let b = Taxonomy::for_family(FileFamily::B);
        assert!(b.sections().iter().all(|s| !b.is_combined_group(s.output_group)));
    }

    #[test]
    fn test_validation_flags() {
        let a = Taxonomy::for_family(FileFamily::A);
        assert!(a.get("B2B").unwrap().validates_dates());
        assert!(!a.get("HSN").unwrap().validates_dates());
        assert!(a.get("NOPE").is_none());
        assert_eq!(a.title(), "Goods and Services Tax - Form GSTR-1");
    }

    #[test]
    fn test_misconfiguration_is_rejected() {
        static DUPLICATED: &[SectionSpec] = &[
            SectionSpec::plain("B2B", "one", "1"),
            SectionSpec::plain("B2B", "two", "2"),
        ];
        let err = Taxonomy::from_sections(FileFamily::B, DUPLICATED)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate section key"));

        static NO_DATE: &[SectionSpec] = &[SectionSpec {
            validation_required: true,
            ..SectionSpec::plain("EXP", "Exports", "6A")
        }];
        assert!(Taxonomy::from_sections(FileFamily::A, NO_DATE)
            .validate()
            .is_err());
    }
}
