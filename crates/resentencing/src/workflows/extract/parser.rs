use std::io::Read;

pub(crate) fn read_csv<R: Read>(reader: R) -> Result<(Vec<String>, Vec<Vec<String>>), csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok((headers, rows))
}

pub(crate) fn clean_header(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn header_key(value: &str) -> String {
    clean_header(value).to_ascii_lowercase()
}
