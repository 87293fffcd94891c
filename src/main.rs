mod config;
mod export;
mod inference;
mod notice;
mod parser;
mod pipeline;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, API_KEY_ENV, DEFAULT_CONFIG_PATH};
use crate::inference::HttpInference;
use crate::parser::{ExtractedText, PdfParser, TextExtractor};
use crate::pipeline::{Document, Pipeline};
use crate::utils::logger;

#[derive(Parser)]
#[command(name = "litigation-tracker")]
#[command(about = "GST 通知书信息提取，生成诉讼跟踪表", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Xlsx,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置文件
    Init,
    /// 提取通知书信息并导出表格
    Extract {
        /// PDF 文件或目录（目录按文件名排序）
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// 输出文件路径
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 输出格式
        #[arg(long, value_enum, default_value = "xlsx")]
        format: OutputFormat,
    },
    /// 打印将发送给模型的文本
    Text {
        path: PathBuf,
        /// 不截断
        #[arg(long)]
        full: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command(&cli.config)?;
        }
        Commands::Extract {
            paths,
            output,
            format,
        } => {
            extract_command(&cli.config, &paths, output, format).await?;
        }
        Commands::Text { path, full } => {
            text_command(&cli.config, &path, full).await?;
        }
    }

    Ok(())
}

fn init_command(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        info!("配置文件已存在，跳过: {}", config_path.display());
        return Ok(());
    }

    AppConfig::default()
        .save(config_path)
        .with_context(|| format!("写入配置文件失败: {}", config_path.display()))?;
    info!("已生成配置文件: {}", config_path.display());
    info!("下一步:");
    info!("  1. 设置环境变量 {} 或在配置文件中填写 api_key", API_KEY_ENV);
    info!("  2. 运行 'litigation-tracker extract <PDF或目录>'");
    Ok(())
}

async fn extract_command(
    config_path: &Path,
    paths: &[PathBuf],
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let app_config = AppConfig::load(config_path).context("加载配置失败")?;

    let pdf_files = collect_pdfs(paths).await?;
    if pdf_files.is_empty() {
        anyhow::bail!("没有找到PDF文件");
    }
    info!("找到 {} 个PDF文件", pdf_files.len());

    let mut documents = Vec::with_capacity(pdf_files.len());
    for path in &pdf_files {
        let document = Document::from_path(path)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        documents.push(document);
    }

    let backend = HttpInference::new(app_config.inference.clone())?;
    let pipeline = Pipeline::new(
        Arc::new(PdfParser::new()),
        Arc::new(backend),
        &app_config.extraction,
    );

    let report = pipeline.run(documents).await;
    for (source, reason) in &report.dropped {
        warn!("  ❌ {}: {}", source, reason);
    }
    let table = report.into_table()?;
    for row in table.rows() {
        info!("  ✅ {}", row.source());
    }

    let artifact = match format {
        OutputFormat::Xlsx => {
            let path = output.unwrap_or_else(|| PathBuf::from(&app_config.export.output_path));
            let file_name = file_name_of(&path);
            let artifact = export::to_xlsx(&table, &file_name, &app_config.export.sheet_name)?;
            (path, artifact)
        }
        OutputFormat::Json => {
            let path = output.unwrap_or_else(|| {
                PathBuf::from(&app_config.export.output_path).with_extension("json")
            });
            let file_name = file_name_of(&path);
            (path, export::to_json(&table, &file_name)?)
        }
    };

    let (path, artifact) = artifact;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &artifact.bytes)
        .await
        .with_context(|| format!("写入输出文件失败: {}", path.display()))?;

    info!(
        "✅ 已导出 {} 条记录: {} ({}, {})",
        table.len(),
        path.display(),
        artifact.file_name,
        artifact.content_type
    );
    Ok(())
}

async fn text_command(config_path: &Path, path: &Path, full: bool) -> Result<()> {
    let app_config = AppConfig::load(config_path).context("加载配置失败")?;
    let document = Document::from_path(path)
        .await
        .with_context(|| format!("读取文件失败: {}", path.display()))?;

    let raw = tokio::task::spawn_blocking(move || PdfParser::new().extract(&document.bytes))
        .await??;

    if full {
        println!("{}", raw.trim());
        return Ok(());
    }

    let text = ExtractedText::bounded(&raw, app_config.extraction.max_text_chars);
    if text.is_empty() {
        info!("文档中没有可提取的文本（可能是扫描件）");
        return Ok(());
    }
    println!("{}", text.as_str());
    if text.is_truncated() {
        info!(
            "文本已截断到 {} 字符，之后的内容不会发送给模型",
            app_config.extraction.max_text_chars
        );
    }
    Ok(())
}

/// 文件按参数顺序，目录内的 *.pdf 按文件名排序
async fn collect_pdfs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut pdf_files = Vec::new();

    for path in paths {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("路径不存在: {}", path.display()))?;

        if !metadata.is_dir() {
            pdf_files.push(path.clone());
            continue;
        }

        let mut in_dir = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if is_pdf(&entry_path) && entry_path.is_file() {
                in_dir.push(entry_path);
            }
        }
        in_dir.sort();
        pdf_files.extend(in_dir);
    }

    Ok(pdf_files)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| export::DEFAULT_FILE_NAME.to_string())
}
