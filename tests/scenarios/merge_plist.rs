//! Test: merge-plist action

use crate::helpers::*;
use std::path::PathBuf;
use xcpipe::core::config::ConfigOptions;
use xcpipe::core::pipeline::Action;
use xcpipe::core::step::StepKind;

#[tokio::test]
async fn test_merge_inputs_in_order() {
    let dir = output_dir();
    let output = dir.path().join("Merged.plist");
    let options = ConfigOptions {
        action: Some(Action::MergePlist),
        output_root: Some(dir.path().to_string_lossy().into_owned()),
        merge_output: Some(output.to_string_lossy().into_owned()),
        merge_inputs: vec![
            "Config/Base.plist".to_string(),
            "Config/Release Overrides.plist".to_string(),
            "Config/CI.plist".to_string(),
        ],
        ..Default::default()
    };
    let config = resolve_options(&options);

    let result = run_with_mock(&config, MockRunner::new(vec![])).await;

    assert_run_succeeded(&result);
    let spec = result.spec(StepKind::MergePlist);
    assert_eq!(spec.program, "/usr/libexec/PlistBuddy");
    assert_eq!(
        spec.args,
        vec![
            "-c".to_string(),
            "Merge Config/Base.plist".to_string(),
            "-c".to_string(),
            "Merge 'Config/Release Overrides.plist'".to_string(),
            "-c".to_string(),
            "Merge Config/CI.plist".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    );
    assert_eq!(spec.artifacts, vec![output]);
    assert_eq!(
        result.calls[0].1.path,
        dir.path().join(PathBuf::from("merge-plist.log"))
    );
}
