//! UniProt client against mock primary and secondary services

mod common;

use common::{fetcher, DEAD_URL};
use seqmap_ingest::uniprot::{reformat, ExchangeFormat, MatchKind, UniProtClient, UniProtConfig};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn entry(acc: &str, secondary: &str, tax: i64, sequence: &str) -> String {
    format!(
        r#"<entry dataset="Swiss-Prot" created="1986-07-21" modified="2021-06-02" version="190">
  <accession>{acc}</accession>
  <accession>{secondary}</accession>
  <name>{acc}_TEST</name>
  <protein><recommendedName><fullName>Protein {acc}</fullName></recommendedName></protein>
  <gene><name type="primary">G{acc}</name></gene>
  <organism>
    <name type="scientific">Homo sapiens</name>
    <dbReference type="NCBI Taxonomy" id="{tax}"/>
  </organism>
  <comment type="alternative products">
    <isoform><id>{acc}-2</id><name>2</name><sequence type="described" ref="VSP_9"/></isoform>
  </comment>
  <feature type="splice variant" id="VSP_9" description="In isoform 2.">
    <location><begin position="1"/><end position="2"/></location>
  </feature>
  <sequence length="{len}" mass="1" checksum="X" modified="1986-07-21" version="1">{sequence}</sequence>
</entry>"#,
        acc = acc,
        secondary = secondary,
        tax = tax,
        len = sequence.len(),
        sequence = sequence,
    )
}

fn document(entries: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<uniprot xmlns=\"http://uniprot.org/uniprot\">\n{}\n</uniprot>",
        entries.join("\n")
    )
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_fetch_list_falls_back_to_secondary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uniprotkb/accessions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/proteins/api/proteins"))
        .and(query_param("size", "-1"))
        .and(header("accept", "application/xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(document(&[
            entry("P69905", "P01922", 9606, "MVLSPADKTN"),
            entry("P68871", "A4GX73", 9606, "MVHLTPEEKS"),
        ])))
        .mount(&server)
        .await;

    let config = UniProtConfig::default()
        .with_urls(server.uri(), server.uri())
        .with_save_text(true);
    let mut client = UniProtClient::new(config, fetcher()).unwrap();
    let input = ids(&["P69905", "P68871-2", "A4GX73", "Q99999"]);
    let (records, matches) = client.fetch_list(&input, true, true).await;

    assert!(records.contains_key("P69905"));
    assert_eq!(records["P68871-2"].sequence.as_deref(), Some("HLTPEEKS"));
    assert_eq!(records["P68871-2"].isoform_sequence_updated, Some(true));

    assert_eq!(matches["P69905"].matched, MatchKind::Primary);
    assert_eq!(matches["P68871-2"].search_id, "P68871");
    assert_eq!(matches["A4GX73"].matched, MatchKind::Secondary);
    assert_eq!(matches["A4GX73"].matched_ids["P68871"], Some(9606));
    assert_eq!(matches["Q99999"].matched, MatchKind::None);

    let dir = tempfile::tempdir().unwrap();
    let xml_path = dir.path().join("out/uniprot.xml");
    client.write_xml(&xml_path).unwrap();
    assert!(std::fs::read_to_string(&xml_path).unwrap().contains("P68871_TEST"));

    let exchange = reformat(&records, ExchangeFormat::Exchange);
    assert_eq!(exchange["P69905"].rcsb_uniprot_entry_name, ["P69905_TEST"]);
}

#[tokio::test]
async fn test_fetch_list_chunks_and_skips_failures() {
    let server = MockServer::start().await;
    Mock::given(path("/uniprotkb/accessions"))
        .and(query_param("accessions", "P69905"))
        .respond_with(ResponseTemplate::new(200).set_body_string(document(&[entry(
            "P69905", "P01922", 9606, "MVLSPADKTN",
        )])))
        .mount(&server)
        .await;
    Mock::given(path("/uniprotkb/accessions"))
        .and(query_param("accessions", "P68871"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ERROR: service busy"))
        .mount(&server)
        .await;

    let config = UniProtConfig::default()
        .with_urls(server.uri(), DEAD_URL)
        .with_chunk_size(1);
    let mut client = UniProtClient::new(config, fetcher()).unwrap();
    let (records, matches) = client.fetch_list(&ids(&["P69905", "P68871", "P69905"]), true, true).await;

    assert_eq!(records.len(), 1);
    assert_eq!(matches.len(), 2);
    assert_eq!(matches["P68871"].matched, MatchKind::None);
}

#[tokio::test]
async fn test_fetch_list_secondary_only() {
    let server = MockServer::start().await;
    Mock::given(path("/proteins/api/proteins"))
        .respond_with(ResponseTemplate::new(200).set_body_string(document(&[entry(
            "P69905", "P01922", 9606, "MVLSPADKTN",
        )])))
        .expect(1)
        .mount(&server)
        .await;

    let config = UniProtConfig::default().with_urls(DEAD_URL, server.uri());
    let mut client = UniProtClient::new(config, fetcher()).unwrap();
    let (records, _) = client.fetch_list(&ids(&["P69905"]), false, true).await;
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_fetch_sequences_retries_missing_ids() {
    let server = MockServer::start().await;
    Mock::given(path("/uniprotkb/P69905.fasta"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            ">sp|P69905|HBA_HUMAN Hemoglobin subunit alpha OS=Homo sapiens OX=9606 GN=HBA1 PE=1 SV=2\nMVLSPADKTN\nVKAAWGKVGA\n",
        ))
        .mount(&server)
        .await;
    Mock::given(path("/proteins/api/proteins/P68871"))
        .and(header("accept", "text/x-fasta"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            ">sp|P68871|HBB_HUMAN Hemoglobin subunit beta OS=Homo sapiens OX=9606 GN=HBB PE=1 SV=2\nmvhltpeeks\n",
        ))
        .mount(&server)
        .await;

    let config = UniProtConfig::default().with_urls(server.uri(), server.uri());
    let client = UniProtClient::new(config, fetcher()).unwrap();
    let (ok, sequences) = client
        .fetch_sequences(&ids(&["P69905", "P68871"]), true, true)
        .await;

    assert!(ok);
    assert_eq!(sequences["P69905"].sequence, "MVLSPADKTNVKAAWGKVGA");
    assert_eq!(sequences["P68871"].sequence, "MVHLTPEEKS");
    assert_eq!(sequences["P68871"].header.gene.as_deref(), Some("HBB"));

    let (ok, partial) = client.fetch_sequences(&ids(&["P68871"]), true, false).await;
    assert!(!ok);
    assert!(partial.is_empty());
}

#[tokio::test]
async fn test_gene_lookup_and_lookup() {
    let server = MockServer::start().await;
    Mock::given(path("/uniprotkb/search"))
        .and(query_param("format", "list"))
        .and(query_param("query", "gene:\"HBA1\" AND taxonomy_id:9606 AND reviewed:true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("P69905\n\n"))
        .mount(&server)
        .await;
    Mock::given(path("/uniprotkb/search"))
        .and(query_param("query", "gene:HBA1 OR gene:HBB"))
        .respond_with(ResponseTemplate::new(200).set_body_string("P69905\nP68871\n"))
        .mount(&server)
        .await;

    let config = UniProtConfig::default().with_urls(server.uri(), server.uri());
    let client = UniProtClient::new(config, fetcher()).unwrap();

    assert_eq!(client.gene_lookup("HBA1", 9606, true).await.unwrap(), ["P69905"]);
    assert_eq!(
        client.lookup(&ids(&["HBA1", "HBB"]), "gene").await.unwrap(),
        ["P69905", "P68871"]
    );
    assert!(client.lookup(&[], "gene").await.unwrap().is_empty());
    assert!(client.gene_lookup("HBB", 10090, false).await.is_err());
}
