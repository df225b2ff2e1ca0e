use std::path::{Path, PathBuf};

use docvec::{
    ExtractorRegistry,
    embedding::HashingEmbedder,
    indexer::{IndexSettings, Indexer},
};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let docs = data_dir.join("docs");
    std::fs::create_dir_all(&docs)?;
    std::fs::write(docs.join("a.txt"), "organoid cancer therapy")?;
    std::fs::write(docs.join("b.txt"), "unrelated weather data")?;

    let embedder = HashingEmbedder::default();
    let extractors = ExtractorRegistry::default();
    let indexer =
        Indexer::new(&embedder, &extractors, IndexSettings::unthrottled())?;
    indexer.run_in(&[docs], &data_dir.join("store"), &mut |_| {})?;

    Ok(())
}

#[tokio::test]
async fn mcp_stdio_search_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = docvec_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("DOCVEC_DATA_DIR", tempdir.path())
                .env("DOCVEC_EMBEDDER", "hashing");
        }),
    )?;

    let client = ().serve(transport).await?;

    let args = json!({
        "query": "cancer treatment",
        "limit": 1
    });

    let result = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "docvec_search".into(),
            arguments: Some(args.as_object().unwrap().clone()),
            task: None,
        })
        .await?;

    let structured = result.structured_content.expect("structured content");
    let results = structured
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");

    assert_eq!(results.len(), 1);
    let source = results[0]
        .get("source")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(source.ends_with("a.txt"));

    let status = client
        .peer()
        .call_tool(CallToolRequestParams {
            meta: None,
            name: "docvec_status".into(),
            arguments: None,
            task: None,
        })
        .await?;
    let structured = status.structured_content.expect("structured content");
    assert_eq!(structured["store"]["state"], "ready");
    assert_eq!(structured["store"]["files"], 2);

    client.cancel().await?;
    Ok(())
}

fn docvec_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Ok(bin) = std::env::var("CARGO_BIN_EXE_docvec") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("docvec");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
