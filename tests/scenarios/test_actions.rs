//! Test: build-for-testing, test and test-without-building actions

use crate::helpers::*;
use xcpipe::core::config::ConfigOptions;
use xcpipe::core::pipeline::Action;
use xcpipe::core::step::StepKind;

const SIMULATOR: &str = "platform=iOS Simulator,name=iPhone 15 Pro,OS=17.5";

fn test_options(action: Action, root: &std::path::Path) -> ConfigOptions {
    ConfigOptions {
        action: Some(action),
        workspace: Some("App.xcworkspace".to_string()),
        scheme: Some("App".to_string()),
        destination: Some(SIMULATOR.to_string()),
        test_plan: Some("UnitTests".to_string()),
        output_root: Some(root.to_string_lossy().into_owned()),
        xcodebuild_args: vec!["-parallel-testing-enabled".to_string(), "NO".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_test_action_single_step() {
    let dir = output_dir();
    let config = resolve_options(&test_options(Action::Test, dir.path()));

    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    assert_run_succeeded(&result);
    assert_execution_order(&result, &[StepKind::Test]);

    let spec = result.spec(StepKind::Test);
    assert_eq!(spec.args[0], "test");
    assert_flag(spec, "-workspace", "App.xcworkspace");
    assert_flag(spec, "-destination", SIMULATOR);
    assert_flag(spec, "-testPlan", "UnitTests");

    let bundle = dir.path().join("App_test.xcresult");
    assert_flag(spec, "-resultBundlePath", &bundle.to_string_lossy());
    assert_eq!(spec.clean_paths, vec![bundle]);

    let n = spec.args.len();
    assert_eq!(&spec.args[n - 2..], &["-parallel-testing-enabled", "NO"]);
}

#[tokio::test]
async fn test_failing_tests_propagate_status() {
    let dir = output_dir();
    let config = resolve_options(&test_options(Action::Test, dir.path()));

    let result = run_with_mock(&config, MockRunner::new(vec![MockOutcome::Exit(65)])).await;

    assert_failed_at(&result, StepKind::Test);
    assert_eq!(result.exit_code(), 65);
}

#[tokio::test]
async fn test_build_for_testing_skips_test_plan() {
    let dir = output_dir();
    let config = resolve_options(&test_options(Action::BuildForTesting, dir.path()));

    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    let spec = result.spec(StepKind::BuildForTesting);
    assert_eq!(spec.args[0], "build-for-testing");
    assert!(!spec.has_flag("-testPlan"));
    assert_flag(spec, "-destination", SIMULATOR);
    assert_flag(
        spec,
        "-resultBundlePath",
        &dir.path().join("App_build-for-testing.xcresult").to_string_lossy(),
    );
}

#[tokio::test]
async fn test_prebuilt_products_replace_project_and_scheme() {
    let dir = output_dir();
    let products = dir.path().join("App.xctestproducts");
    let options = ConfigOptions {
        scheme: None,
        workspace: None,
        test_products: Some(products.to_string_lossy().into_owned()),
        ..test_options(Action::TestWithoutBuilding, dir.path())
    };
    let config = resolve_options(&options);

    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    assert_run_succeeded(&result);
    let spec = result.spec(StepKind::TestWithoutBuilding);
    assert_flag(spec, "-testProductsPath", &products.to_string_lossy());
    assert!(!spec.has_flag("-workspace"));
    assert!(!spec.has_flag("-scheme"));
    assert!(!spec.has_flag("-testPlan"));
    assert_eq!(
        result.calls[0].1.path,
        dir.path().join("App_test-without-building.log")
    );
}
