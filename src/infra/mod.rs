pub mod csv_exporter;
pub mod file_loader;
pub mod in_memory_loader;
pub mod parquet_exporter;
pub mod report_writer;
pub mod sqlite_exporter;
pub mod workbook_exporter;
