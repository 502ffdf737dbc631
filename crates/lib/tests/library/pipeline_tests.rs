//! Parse, extract, convert and render fixture documents end to end.

use qronos_lib::document::ExtractionPath;
use qronos_lib::render::{RenderOptions, generate_document};
use qronos_lib::{ConfigDocument, Dialect, TranspileOptions, Value};

use super::common::load_fixture;

fn index<'a>(value: &'a Value, key: &str) -> &'a Value {
  value
    .as_dict()
    .and_then(|dict| dict.get_str(key))
    .unwrap_or_else(|| panic!("no key {} in {}", key, value))
}

fn first(value: &Value) -> &Value {
  &value.as_seq().expect("expected a sequence")[0]
}

mod pos {
  use super::*;

  #[test]
  fn executes_with_mocked_environment() {
    let doc = load_fixture("pos_config.py");
    assert_eq!(doc.dialect(), Dialect::Pos);
    assert_eq!(doc.extraction(), &ExtractionPath::Executed);
    assert_eq!(doc.fields()["strategy_name"], Value::str("demo_pos"));
    assert_eq!(doc.fields()["is_pure_long"], Value::Bool(false));
    assert_eq!(doc.fields()["rebalance_mode"], Value::Null);
    assert_eq!(doc.placeholder_fields().count(), 0);
  }

  #[test]
  fn builtin_calls_are_evaluated() {
    let doc = load_fixture("pos_config.py");
    let strategy = first(index(first(&doc.fields()["strategy_pool"]), "strategy_list"));
    let offsets = index(strategy, "offset_list").as_seq().unwrap();
    assert_eq!(offsets.len(), 24);
    assert_eq!(offsets[23], Value::Int(23));
  }

  #[test]
  fn into_pos_keeps_source_text() {
    let doc = load_fixture("pos_config.py");
    let text = doc.raw_text().to_string();
    assert_eq!(doc.into_pos(Some("ignored")).unwrap().raw_text(), text);
  }
}

mod coin {
  use super::*;

  #[test]
  fn coin1_takes_first_account_strategies() {
    let doc = load_fixture("coin1_config.py");
    assert_eq!(doc.dialect(), Dialect::Coin1);
    assert_eq!(doc.extraction(), &ExtractionPath::Executed);
    let expected = index(index(&doc.fields()["account_config"], "main"), "strategy_list").clone();

    let pos = doc.into_pos(None).unwrap();
    assert_eq!(pos.fields()["strategy_name"], Value::str("coin1_demo"));
    let entry = first(&pos.fields()["strategy_pool"]);
    assert_eq!(index(entry, "name"), &Value::str("coin1_demo"));
    assert_eq!(index(entry, "strategy_list"), &expected);
    assert_eq!(pos.fields()["leverage"], Value::Int(2));
  }

  #[test]
  fn coin2_comprehension_and_carried_fields() {
    let doc = load_fixture("coin2_config.py");
    assert_eq!(doc.dialect(), Dialect::Coin2);
    let strategies = doc.fields()["strategy_list"].as_seq().unwrap();
    assert_eq!(strategies.len(), 2);
    assert_eq!(index(&strategies[1], "hold_period"), &Value::str("4H"));

    let pos = doc.into_pos(None).unwrap();
    assert_eq!(pos.fields()["min_kline_num"], Value::Int(168));
    assert!(!pos.fields().contains_key("white_list"));
    assert!(!pos.fields().contains_key("backtest_name"));
    let config = &pos.fields()["strategy_config"];
    assert_eq!(index(config, "name"), &Value::str("FixedRatioStrategy"));
  }

  #[test]
  fn converted_text_is_canonical() {
    for fixture in ["coin1_config.py", "coin2_config.py"] {
      let pos = load_fixture(fixture).into_pos(None).unwrap();
      let reparsed = ConfigDocument::parse(pos.raw_text(), &TranspileOptions::default()).unwrap();
      assert_eq!(reparsed.dialect(), Dialect::Pos, "{}", fixture);
      assert_eq!(reparsed.extraction(), &ExtractionPath::Executed, "{}", fixture);

      let name = pos.fields()["strategy_name"].as_str().unwrap().to_string();
      let regenerated = generate_document(reparsed.fields(), &name, &RenderOptions::default());
      assert_eq!(regenerated, pos.raw_text(), "{}", fixture);
    }
  }
}

mod fallback {
  use super::*;

  #[test]
  fn unsupported_statement_falls_back_to_node_walk() {
    let doc = load_fixture("partial_config.py");
    assert_eq!(doc.dialect(), Dialect::Pos);
    assert!(matches!(doc.extraction(), ExtractionPath::NodeWalk { .. }));
    assert_eq!(doc.fields()["strategy_name"], Value::str("partial"));
    assert_eq!(doc.fields()["get_kline_num"], Value::Int(999));
    assert_eq!(
      doc.fields()["leverage"],
      Value::UnresolvedVariable("missing_leverage".into())
    );
    assert_eq!(
      doc.placeholder_fields().collect::<Vec<_>>(),
      ["black_list", "leverage"]
    );
  }

  #[test]
  fn shared_list_mutation_falls_back_to_node_walk() {
    let text = "strategy_name = 'shared'\nbase = ['BTC-USDT']\nblack_list = base\nbase.append('ETH-USDT')\n";
    let doc = ConfigDocument::parse(text, &TranspileOptions::default()).unwrap();
    let ExtractionPath::NodeWalk { reason } = doc.extraction() else {
      panic!("expected node walk, got {:?}", doc.extraction());
    };
    assert!(reason.contains("shared with another name"), "{}", reason);
    assert_eq!(doc.fields()["strategy_name"], Value::str("shared"));
  }

  #[test]
  fn deeply_nested_literal_is_a_parse_error() {
    let text = format!("strategy_name = 'deep'\nblack_list = {}1{}\n", "[".repeat(4000), "]".repeat(4000));
    let err = ConfigDocument::parse(&text, &TranspileOptions::default()).unwrap_err();
    assert_eq!(err.line, 2);
    assert_eq!(err.message, "expression too deeply nested");
  }

  #[test]
  fn placeholders_render_as_names_and_markers() {
    let doc = load_fixture("partial_config.py");
    let text = generate_document(doc.fields(), "partial", &RenderOptions::default());
    assert!(text.contains("leverage = missing_leverage  # leverage"));
    assert!(text.contains("black_list = '<unparsable: "));
  }
}

#[test]
fn narrow_render_options_wrap_containers() {
  let doc = load_fixture("pos_config.py");
  let narrow = RenderOptions {
    indent_width: 2,
    line_width: 10,
  };
  let text = generate_document(doc.fields(), "demo_pos", &narrow);
  assert!(text.contains("black_list = [\n  'BTC-USDT'\n]"), "{}", text);
}
