// Printing the generated comparisons, optionally checked against a reference.

use crate::session::*;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub fn plan_to_json(pairs: &[Pair]) -> JSValue {
    let comparisons: Vec<JSValue> = pairs
        .iter()
        .map(|p| {
            json!({
                "comparisonId": p.comparison_id,
                "sectionId": p.section_id,
                "sectionType": p.section_type,
                "left": p.left.codename,
                "right": p.right.codename,
            })
        })
        .collect();
    json!({ "comparisons": comparisons })
}

fn read_reference(path: &str) -> SessionResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    serde_json::from_str(&contents).context(ParsingJsonSnafu { path })
}

/// Generates the comparisons and prints them in JSON format.
///
/// With a reference file, the output is compared to it and the differences are printed.
pub fn run_plan<G: Rng>(
    catalog: &OutletCatalog,
    config: &SurveyConfig,
    rng: &mut G,
    reference_path: Option<&str>,
) -> SessionResult<()> {
    let pairs = generate_pairs(catalog, config, rng);
    info!("run_plan: {} comparisons", pairs.len());
    let plan_js = plan_to_json(&pairs);
    let pretty_js_plan = serde_json::to_string_pretty(&plan_js).context(WritingJsonSnafu {})?;
    println!("{}", pretty_js_plan);

    if let Some(reference_p) = reference_path {
        let reference = read_reference(reference_p)?;
        let pretty_js_reference =
            serde_json::to_string_pretty(&reference).context(WritingJsonSnafu {})?;
        if pretty_js_reference != pretty_js_plan {
            warn!("Found differences with the reference plan");
            print_diff(pretty_js_reference.as_str(), pretty_js_plan.as_str(), "\n");
            whatever!("Difference detected between generated plan and reference plan")
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn radio_setup() -> (OutletCatalog, SurveyConfig) {
        let config = SurveyConfig {
            sections: vec![Section {
                id: 4,
                kind: MediaType::Radio,
                name: "Radio".to_string(),
            }],
            comparisons_per_section: 2,
            mainstream_outlets: vec![],
        };
        let mut b = CatalogBuilder::new(&config);
        b.add_outlet_simple("a", "A", MediaType::Radio);
        b.add_outlet_simple("b", "B", MediaType::Radio);
        (b.build().unwrap(), config)
    }

    #[test]
    fn plan_lists_the_comparisons() {
        let (catalog, config) = radio_setup();
        let pairs = generate_pairs(&catalog, &config, &mut StdRng::seed_from_u64(0));
        let js = plan_to_json(&pairs);
        let comparisons = js["comparisons"].as_array().unwrap();
        assert_eq!(comparisons.len(), 2);
        assert_eq!(comparisons[1]["comparisonId"], "4-2");
        assert_eq!(comparisons[0]["sectionType"], "radio");
    }

    #[test]
    fn matching_reference() {
        let (catalog, config) = radio_setup();
        let pairs = generate_pairs(&catalog, &config, &mut StdRng::seed_from_u64(5));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        fs::write(&path, serde_json::to_string(&plan_to_json(&pairs)).unwrap()).unwrap();

        let res = run_plan(
            &catalog,
            &config,
            &mut StdRng::seed_from_u64(5),
            path.to_str(),
        );
        assert!(res.is_ok());
    }

    #[test]
    fn differing_reference() {
        let (catalog, config) = radio_setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference.json");
        fs::write(&path, r#"{"comparisons": []}"#).unwrap();
        let res = run_plan(
            &catalog,
            &config,
            &mut StdRng::seed_from_u64(5),
            path.to_str(),
        );
        assert!(matches!(res, Err(SessionError::Whatever { .. })));
    }
}
