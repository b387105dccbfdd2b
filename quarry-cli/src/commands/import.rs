use anyhow::{Context, Result};
use quarry::{Client, Document};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

/// Source for documents to import
pub enum DocumentSource {
    FromFile(PathBuf),
    FromStdin,
}

impl DocumentSource {
    pub fn reader(&self) -> io::Result<Box<dyn BufRead + Send>> {
        match self {
            DocumentSource::FromFile(path) => {
                let file = File::open(path)?;
                Ok(Box::new(BufReader::new(file)))
            }
            DocumentSource::FromStdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

/// Progress tracking for import
struct ImportProgress {
    docs_imported: usize,
    bytes_processed: usize,
    start_time: Instant,
}

impl ImportProgress {
    fn new() -> Self {
        Self {
            docs_imported: 0,
            bytes_processed: 0,
            start_time: Instant::now(),
        }
    }

    fn add(&mut self, docs: usize, bytes: usize) {
        self.docs_imported += docs;
        self.bytes_processed += bytes;
    }

    fn print_progress(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            eprint!(
                "\r  Imported {} docs ({:.1} docs/s)    ",
                self.docs_imported,
                self.docs_imported as f64 / elapsed
            );
        }
    }

    fn finish(&self) {
        let elapsed = self.start_time.elapsed();

        eprintln!();
        println!("Import completed:");
        println!("  Documents: {}", self.docs_imported);
        println!("  Bytes:     {:.2} MB", self.bytes_processed as f64 / 1_000_000.0);
        println!("  Time:      {:.2}s", elapsed.as_secs_f64());
    }
}

/// Bulk-index a JSONL stream into a collection
pub async fn run_import(
    client: &Client,
    collection: &str,
    source: DocumentSource,
    batch_size: usize,
    no_progress: bool,
) -> Result<()> {
    let query = client.query(collection);
    let batch_size = batch_size.max(1);
    let mut progress = ImportProgress::new();
    let reader = source.reader()?;

    let mut batch: Vec<Document> = Vec::with_capacity(batch_size);
    let mut batch_bytes = 0usize;
    let mut last_progress = Instant::now();

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        let doc: Document = serde_json::from_str(&line).with_context(|| {
            let preview: String = line.chars().take(100).collect();
            format!("Line {} is not a JSON object: {}", line_no + 1, preview)
        })?;

        batch_bytes += line.len();
        batch.push(doc);

        if batch.len() >= batch_size {
            let count = batch.len();
            query
                .insert_many(std::mem::take(&mut batch))
                .await
                .context("Bulk import failed")?;
            progress.add(count, batch_bytes);
            batch_bytes = 0;

            if !no_progress && last_progress.elapsed().as_millis() > 100 {
                progress.print_progress();
                last_progress = Instant::now();
            }
        }
    }

    if !batch.is_empty() {
        let count = batch.len();
        query
            .insert_many(batch)
            .await
            .context("Bulk import failed")?;
        progress.add(count, batch_bytes);
    }

    if !no_progress {
        progress.finish();
    }
    tracing::info!(collection, documents = progress.docs_imported, "import finished");

    Ok(())
}
