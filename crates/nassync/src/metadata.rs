//! Metadata extraction from NAS file paths.
//!
//! Reports are filed on the NAS as
//! `<base>/<folder>/<indicator>_<company>_<year>.pdf`, where the folder name
//! is either `<prefix>_<industry>_<x>_<y>` or `<industry>_<x>_<y>`.
//! Extraction never fails: anything that does not follow the convention is
//! reported through `validation_errors`.

use chrono::Datelike;
use serde::Serialize;

/// Earliest reporting year accepted in a file name.
pub const MIN_YEAR: i32 = 2000;

/// Structured fields derived from one remote file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFileMetadata {
    pub file_path: String,
    pub file_name: String,
    pub industry: String,
    pub indicator: String,
    pub company: String,
    pub year: String,
    pub is_valid: bool,
    pub validation_errors: Vec<String>,
}

/// Parses and validates remote paths against the naming convention.
#[derive(Debug, Clone, Copy)]
pub struct PathMetadataExtractor {
    max_year: i32,
}

impl Default for PathMetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PathMetadataExtractor {
    /// Creates an extractor accepting years up to next calendar year (UTC).
    pub fn new() -> Self {
        Self::with_max_year(chrono::Utc::now().year() + 1)
    }

    /// Creates an extractor with a fixed upper year bound.
    pub fn with_max_year(max_year: i32) -> Self {
        Self { max_year }
    }

    pub fn max_year(&self) -> i32 {
        self.max_year
    }

    /// Derives `{industry, indicator, company, year}` from `file_path`.
    pub fn extract(&self, file_path: &str) -> ExtractedFileMetadata {
        let mut errors = Vec::new();

        let segments: Vec<&str> = file_path.split('/').collect();
        let file_name = segments.last().copied().unwrap_or_default().to_string();

        let (stem, extension) = split_extension(&file_name);
        if !extension.eq_ignore_ascii_case("pdf") {
            errors.push(format!(
                "Invalid file extension '{}': not a PDF (expected .pdf)",
                extension
            ));
        }

        let folder = if segments.len() >= 2 {
            segments[segments.len() - 2]
        } else {
            ""
        };
        let industry = match industry_from_folder(folder) {
            Some(industry) => industry,
            None => {
                errors.push(format!(
                    "Folder name '{}' does not match pattern {{prefix}}_{{industry}}_{{x}}_{{y}} \
                     or {{industry}}_{{x}}_{{y}}",
                    folder
                ));
                String::new()
            }
        };

        let parts: Vec<&str> = stem.split('_').collect();
        let (indicator, company, year) = if parts.len() < 3 {
            errors.push(format!(
                "File name '{}' does not follow pattern {{indicator}}_{{company}}_{{year}}",
                stem
            ));
            (String::new(), String::new(), String::new())
        } else {
            let indicator = parts[0].trim().to_string();
            let year = parts[parts.len() - 1].trim().to_string();
            let company = parts[1..parts.len() - 1].join("_").trim().to_string();

            if indicator.is_empty() {
                errors.push("Indicator is empty".to_string());
            }
            if company.is_empty() {
                errors.push("Company is empty".to_string());
            }
            self.check_year(&year, &mut errors);

            (indicator, company, year)
        };

        ExtractedFileMetadata {
            file_path: file_path.to_string(),
            file_name,
            industry,
            indicator,
            company,
            year,
            is_valid: errors.is_empty(),
            validation_errors: errors,
        }
    }

    fn check_year(&self, year: &str, errors: &mut Vec<String>) {
        if year.is_empty() {
            errors.push("Year is empty".to_string());
            return;
        }
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
            errors.push(format!("Year '{}' must be a 4-digit number", year));
            return;
        }
        // Four ASCII digits always parse.
        let value: i32 = year.parse().unwrap_or_default();
        if !(MIN_YEAR..=self.max_year).contains(&value) {
            errors.push(format!(
                "Year {} is out of range ({}-{})",
                value, MIN_YEAR, self.max_year
            ));
        }
    }
}

/// Splits `name` at its last dot. A name without a dot has an empty extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) => (&name[..idx], &name[idx + 1..]),
        None => (name, ""),
    }
}

fn industry_from_folder(folder: &str) -> Option<String> {
    let parts: Vec<&str> = folder.split('_').collect();
    match parts.len() {
        4 => Some(parts[1].trim().to_string()),
        3 => Some(parts[0].trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> PathMetadataExtractor {
        PathMetadataExtractor::with_max_year(2027)
    }

    #[test]
    fn test_four_part_folder() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/GHG_Acme_Corp_2023.pdf");
        assert!(meta.is_valid, "{:?}", meta.validation_errors);
        assert_eq!(meta.industry, "Tech");
        assert_eq!(meta.indicator, "GHG");
        assert_eq!(meta.company, "Acme_Corp");
        assert_eq!(meta.year, "2023");
        assert_eq!(meta.file_name, "GHG_Acme_Corp_2023.pdf");
    }

    #[test]
    fn test_three_part_folder() {
        let meta = extractor().extract("/ESG/Energy_2024_Q1/WATER_Globex_2022.pdf");
        assert!(meta.is_valid, "{:?}", meta.validation_errors);
        assert_eq!(meta.industry, "Energy");
        assert_eq!(meta.company, "Globex");
    }

    #[test]
    fn test_uppercase_extension_accepted() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/GHG_Acme_2023.PDF");
        assert!(meta.is_valid);
    }

    #[test]
    fn test_invalid_year_rejected() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_99.pdf");
        assert!(!meta.is_valid);
        assert!(meta.validation_errors.iter().any(|e| e.contains("4-digit")));
    }

    #[test]
    fn test_non_pdf_rejected() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_2023.docx");
        assert!(!meta.is_valid);
        assert_eq!(meta.validation_errors.len(), 1);
        assert!(meta.validation_errors[0].contains("extension"));
    }

    #[test]
    fn test_year_out_of_range() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_1999.pdf");
        assert!(meta.validation_errors.iter().any(|e| e.contains("out of range")));

        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_2028.pdf");
        assert!(!meta.is_valid);

        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_2027.pdf");
        assert!(meta.is_valid);
    }

    #[test]
    fn test_non_numeric_year() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_Comp_20a3.pdf");
        assert!(meta.validation_errors.iter().any(|e| e.contains("4-digit")));
    }

    #[test]
    fn test_too_few_name_parts() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/IND_2023.pdf");
        assert!(!meta.is_valid);
        assert_eq!(meta.validation_errors.len(), 1);
        assert!(meta.validation_errors[0].contains("{indicator}_{company}_{year}"));
        assert!(meta.indicator.is_empty());
    }

    #[test]
    fn test_empty_fields_each_reported() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/ _ _ .pdf");
        assert_eq!(
            meta.validation_errors,
            vec![
                "Indicator is empty".to_string(),
                "Company is empty".to_string(),
                "Year is empty".to_string(),
            ]
        );
    }

    #[test]
    fn test_bad_folder_segment() {
        let meta = extractor().extract("/ESG/Misc/GHG_Acme_2023.pdf");
        assert!(!meta.is_valid);
        assert!(meta.industry.is_empty());
        assert!(meta.validation_errors[0].contains("'Misc'"));
        // The file name itself still parses.
        assert_eq!(meta.indicator, "GHG");
    }

    #[test]
    fn test_bare_file_name() {
        let meta = extractor().extract("GHG_Acme_2023.pdf");
        assert!(!meta.is_valid);
        assert_eq!(meta.file_name, "GHG_Acme_2023.pdf");
    }

    #[test]
    fn test_no_extension() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/GHG_Acme_2023");
        assert!(meta.validation_errors[0].contains("not a PDF"));
        assert_eq!(meta.year, "2023");
    }

    #[test]
    fn test_fields_are_trimmed() {
        let meta = extractor().extract("/ESG/A_Tech_2024_X/ GHG_ Acme _2023 .pdf");
        assert!(meta.is_valid, "{:?}", meta.validation_errors);
        assert_eq!(meta.indicator, "GHG");
        assert_eq!(meta.company, "Acme");
        assert_eq!(meta.year, "2023");
    }

    #[test]
    fn test_default_max_year_is_next_year() {
        let extractor = PathMetadataExtractor::new();
        assert_eq!(extractor.max_year(), chrono::Utc::now().year() + 1);
    }
}
