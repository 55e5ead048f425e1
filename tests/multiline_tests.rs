use logsig::multiline::{parse_records, RecordAggregator};

fn collect(lines: &[&str]) -> Vec<String> {
    let mut agg = RecordAggregator::default();
    let mut out = Vec::new();
    for l in lines {
        if let Some(r) = agg.push(l) {
            out.push(r);
        }
    }
    if let Some(r) = agg.finish() {
        out.push(r);
    }
    out
}

#[test]
fn single_line_records_pass_through() {
    let lines = [
        r#"MsgID="1" TimeStamp="t" Channel="C" Type="T" Severity="Error" Message="one""#,
        r#"MsgID="2" TimeStamp="t" Channel="C" Type="T" Severity="Error" Message="two""#,
    ];
    assert_eq!(collect(&lines), vec![lines[0].to_string(), lines[1].to_string()]);
}

#[test]
fn joins_message_spanning_lines() {
    let lines = [
        r#"MsgID="1" TimeStamp="t" Channel="C" Type="T" Severity="Error" Message="Aspiration failed"#,
        "  at channel 3",
        r#"  retry later""#,
    ];
    let out = collect(&lines);
    assert_eq!(out.len(), 1);
    assert!(out[0].ends_with("Message=\"Aspiration failed\n  at channel 3\n  retry later\""));
}

#[test]
fn crlf_endings_are_stripped() {
    let out = collect(&["MsgID=\"1\" Message=\"a\r", "b\"\r"]);
    assert_eq!(out, vec!["MsgID=\"1\" Message=\"a\nb\"".to_string()]);
}

#[test]
fn unterminated_record_is_dropped_when_next_starts() {
    let lines = [
        r#"MsgID="1" TimeStamp="t" Channel="C" Type="T" Severity="Error" Message="never closed"#,
        r#"MsgID="2" TimeStamp="t" Channel="C" Type="T" Severity="Error" Message="ok""#,
    ];
    assert_eq!(collect(&lines), vec![lines[1].to_string()]);
}

#[test]
fn parse_records_skips_noise() {
    let input = "\
header line without attributes
MsgID=\"1\" TimeStamp=\"2024-06-01 10:30:15\" Channel=\"TEMP\" Type=\"Sensor\" Severity=\"Error\" Message=\"Probe lost
on rack 2\"

MsgID=\"2\" TimeStamp=\"2024-06-01 10:31:00\" Channel=\"DOOR\" Type=\"Lock\" Severity=\"Warning\" Message=\"Door open\"
";
    let recs = parse_records(input.lines());
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].message, "Probe lost\non rack 2");
    assert_eq!(recs[1].channel, "DOOR");
}
