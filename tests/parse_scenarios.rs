use bashparse::{parse, ErrorKind, Node, Parser, ParserOptions};
use serde_json::{json, Value};

fn parse_json(input: &str) -> Value {
    let nodes = parse(input, false).unwrap();
    serde_json::to_value(&nodes).unwrap()
}

fn parse_single(input: &str) -> Value {
    let json = parse_json(input);
    let Value::Array(mut nodes) = json else {
        panic!("Expected an array of nodes");
    };
    assert_eq!(nodes.len(), 1, "expected one top-level node for {:?}", input);
    nodes.remove(0)
}

fn word_values(command: &Value) -> Vec<String> {
    command["words"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["value"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_blank_and_comment_only_input() {
    assert_eq!(parse_json(""), json!([{ "kind": "empty" }]));
    assert_eq!(parse_json("   \n\t\n"), json!([{ "kind": "empty" }]));
    assert_eq!(parse_json("# nothing here\n# still nothing\n"), json!([{ "kind": "empty" }]));
}

#[test]
fn test_simple_command_shape() {
    let command = parse_single("cmd a b c");
    assert_eq!(command["kind"], "command");
    assert_eq!(word_values(&command), vec!["cmd", "a", "b", "c"]);
    assert_eq!(command["redirects"], json!([]));
}

#[test]
fn test_literal_word_has_no_parts() {
    let command = parse_single("echo hello");
    assert_eq!(command["words"][1], json!({ "value": "hello", "parts": [] }));
}

#[test]
fn test_heredoc_body_is_attached() {
    let command = parse_single("cat <<EOF\nhello\nEOF\n");
    assert_eq!(word_values(&command), vec!["cat"]);
    assert_eq!(
        command["redirects"],
        json!([{
            "kind": "here-doc",
            "delimiter": "EOF",
            "content": "hello\n",
            "strip_tabs": false,
            "quoted": false,
            "fd": null
        }])
    );
}

#[test]
fn test_quoted_heredoc_inside_command_substitution() {
    let command = parse_single("echo $(cat <<'END'\n$HOME\nEND\n)");
    let inner = &command["words"][1]["parts"][0]["expansion"]["command"];
    assert_eq!(inner["redirects"][0]["content"], "$HOME\n");
    assert_eq!(inner["redirects"][0]["quoted"], true);
}

#[test]
fn test_command_substitution_in_double_quotes() {
    let command = parse_single("echo \"$(echo a)\"");
    let word = &command["words"][1];
    assert_eq!(word["value"], "\"$(echo a)\"");
    let parts = word["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!((parts[0]["start"].as_u64(), parts[0]["end"].as_u64()), (Some(1), Some(10)));
    let expansion = &parts[0]["expansion"];
    assert_eq!(expansion["kind"], "command-substitution");
    assert_eq!(expansion["brace"], false);
    assert_eq!(word_values(&expansion["command"]), vec!["echo", "a"]);
}

#[test]
fn test_case_with_two_clauses() {
    let case = parse_single("case $x in a|b) echo hi;; *) ;; esac");
    assert_eq!(case["kind"], "case");
    assert_eq!(case["word"]["value"], "$x");
    let patterns = case["patterns"].as_array().unwrap();
    assert_eq!(patterns.len(), 2);
    assert_eq!(patterns[0]["pattern"], "a|b");
    assert_eq!(patterns[0]["terminator"], ";;");
    assert_eq!(word_values(&patterns[0]["body"]), vec!["echo", "hi"]);
    assert_eq!(patterns[1]["pattern"], "*");
    assert_eq!(patterns[1]["body"], Value::Null);
}

#[test]
fn test_arithmetic_precedence() {
    let command = parse_single("echo $((1 + 2 * 3))");
    let expansion = &command["words"][1]["parts"][0]["expansion"];
    assert_eq!(expansion["kind"], "arithmetic-expansion");
    let expression = &expansion["expression"];
    assert_eq!(expression["op"], "+");
    assert_eq!(expression["left"], json!({ "kind": "number", "value": "1" }));
    assert_eq!(expression["right"]["op"], "*");
    assert_eq!(expression["right"]["left"]["value"], "2");
    assert_eq!(expression["right"]["right"]["value"], "3");
}

#[test]
fn test_unterminated_double_quote() {
    let err = parse("echo \"unterminated", false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.message, "Unterminated double quote");
    assert_eq!((err.line, err.column), (1, 6));
    assert_eq!(err.to_string(), "Parse error at 1:6: Unterminated double quote");
}

#[test]
fn test_unclosed_param_expansion_is_eof_error() {
    let err = parse("echo ${x", false).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnexpectedEof);
}

#[test]
fn test_compound_commands_carry_redirects() {
    let group = parse_single("{ echo a; } >out");
    assert_eq!(group["kind"], "brace-group");
    assert_eq!(group["redirects"][0]["op"], ">");
    assert_eq!(group["redirects"][0]["target"]["value"], "out");

    let looped = parse_single("while true; do echo; done 2>/dev/null");
    assert_eq!(looped["kind"], "while");
    assert_eq!(looped["redirects"][0]["op"], "2>");
    assert_eq!(looped["redirects"][0]["fd"], 2);
}

#[test]
fn test_if_elif_else_chain() {
    let node = parse_single("if a; then b; elif c; then d; else e; fi");
    assert_eq!(node["kind"], "if");
    let elif = &node["else_body"];
    assert_eq!(elif["kind"], "if");
    assert_eq!(word_values(&elif["condition"]), vec!["c"]);
    assert_eq!(word_values(&elif["else_body"]), vec!["e"]);
}

#[test]
fn test_for_loops() {
    let node = parse_single("for x in 1 2; do echo $x; done");
    assert_eq!(node["kind"], "for");
    assert_eq!(node["variable"], "x");
    let items: Vec<&str> = node["words"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["value"].as_str().unwrap())
        .collect();
    assert_eq!(items, vec!["1", "2"]);

    let node = parse_single("for ((i = 0; i < 3; i++)); do :; done");
    assert_eq!(node["kind"], "for-arith");
    assert_eq!(node["init"], "i = 0");
    assert_eq!(node["condition"], "i < 3");
    assert_eq!(node["increment"], "i++");
}

#[test]
fn test_function_definitions() {
    let node = parse_single("greet() { echo hi; }");
    assert_eq!(node["kind"], "function");
    assert_eq!(node["name"], "greet");
    assert_eq!(node["body"]["kind"], "brace-group");

    let node = parse_single("function cleanup { rm -f tmp; }");
    assert_eq!(node["name"], "cleanup");
}

#[test]
fn test_conditional_and_arithmetic_commands() {
    let node = parse_single("[[ -n $x && $y == z ]]");
    assert_eq!(node["kind"], "conditional-expr");
    assert_eq!(node["body"]["kind"], "and");
    assert_eq!(node["body"]["right"]["op"], "==");

    let node = parse_single("(( i++ ))");
    assert_eq!(node["kind"], "arithmetic-command");
    assert_eq!(node["expression"]["kind"], "post-incr");
}

#[test]
fn test_pipeline_and_list_structure() {
    let node = parse_single("a | b && c &");
    assert_eq!(node["kind"], "list");
    let parts = node["parts"].as_array().unwrap();
    assert_eq!(parts[0]["kind"], "pipeline");
    assert_eq!(parts[1], json!({ "kind": "operator", "op": "&&" }));
    assert_eq!(parts[3], json!({ "kind": "operator", "op": "&" }));
}

#[test]
fn test_process_substitution_direction() {
    let command = parse_single("diff <(ls a) >(cat)");
    let first = &command["words"][1]["parts"][0]["expansion"];
    assert_eq!(first["kind"], "process-substitution");
    assert_eq!(first["direction"], "input");
    assert_eq!(command["words"][2]["parts"][0]["expansion"]["direction"], "output");
}

#[test]
fn test_extglob_negated_group() {
    let nodes = parse("ls !(*.txt)", true).unwrap();
    let Node::Command(command) = &nodes[0] else {
        panic!("Expected command");
    };
    assert_eq!(command.words[1].value, "!(*.txt)");
}

#[test]
fn test_limits_from_options() {
    let options = ParserOptions::from_toml_str("max_input_size = 8").unwrap();
    let err = Parser::with_options("echo a long line", options).parse().unwrap_err();
    assert_eq!(err.kind, ErrorKind::LimitExceeded);

    let options = ParserOptions {
        max_depth: 4,
        ..ParserOptions::default()
    };
    let err = Parser::with_options("echo $(echo $(echo $(echo $(echo x))))", options)
        .parse()
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::LimitExceeded);
}

fn collect_kind<'a>(value: &'a Value, kind: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if map.get("kind").and_then(Value::as_str) == Some(kind) {
                out.push(value);
            }
            map.values().for_each(|v| collect_kind(v, kind, out));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_kind(v, kind, out)),
        _ => {}
    }
}

#[test]
fn test_array_assignments_keep_whole_word() {
    let cases = [
        ("a=(1 2)", vec!["a=(1 2)"]),
        ("a+=(x)", vec!["a+=(x)"]),
        ("x=(a b\nc)", vec!["x=(a b\nc)"]),
        ("declare -A m=([a]=1)", vec!["declare", "-A", "m=([a]=1)"]),
        ("local -a arr=([0]=a [1]=b)", vec!["local", "-a", "arr=([0]=a [1]=b)"]),
        ("export A=(x)", vec!["export", "A=(x)"]),
        ("readonly r=(1)", vec!["readonly", "r=(1)"]),
    ];
    for (input, expected) in cases {
        let command = parse_single(input);
        assert_eq!(command["kind"], "command", "{:?}", input);
        assert_eq!(word_values(&command), expected, "{:?}", input);
        let last = command["words"].as_array().unwrap().last().unwrap();
        let mut arrays = Vec::new();
        collect_kind(last, "array", &mut arrays);
        assert_eq!(arrays.len(), 1, "array part in {:?}", input);
    }
}

#[test]
fn test_deeply_nested_command_substitutions_parse_quickly() {
    let depth = 30;
    let bare = format!("echo {}x{}", "$(echo ".repeat(depth), ")".repeat(depth));
    let quoted = format!("echo {}x{}", "\"$(echo ".repeat(depth), ")\"".repeat(depth));
    let handle = std::thread::Builder::new()
        .stack_size(64 << 20)
        .spawn(move || {
            for input in [bare, quoted] {
                let started = std::time::Instant::now();
                let nodes = parse(&input, false).unwrap();
                assert_eq!(nodes.len(), 1);
                let json = serde_json::to_value(&nodes).unwrap();
                let mut subs = Vec::new();
                collect_kind(&json, "command-substitution", &mut subs);
                assert_eq!(subs.len(), 30);
                assert!(
                    started.elapsed() < std::time::Duration::from_secs(5),
                    "took {:?}",
                    started.elapsed()
                );
            }
        })
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn test_arithmetic_missing_operand_is_syntax_error() {
    for input in ["(( * ))", "echo $(( * 2))", "(( 1 + ))"] {
        let err = parse(input, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax, "{:?}", input);
    }
}

#[test]
fn test_trailing_semicolon_shape() {
    assert_eq!(parse_single("echo a;")["kind"], "command");
    assert_eq!(parse_single("echo a;"), parse_single("echo a"));
    let group = parse_single("{ echo a; }");
    assert_eq!(group["body"]["kind"], "command");
    let background = parse_single("echo a &");
    assert_ne!(background["kind"], "command");
}

#[test]
fn test_dparen_subshell_heredoc_attached_once() {
    let command = parse_single("echo $((cat <<EOF\nx\nEOF\n) )");
    let mut subs = Vec::new();
    collect_kind(&command, "command-substitution", &mut subs);
    assert_eq!(subs.len(), 1);
    let mut heredocs = Vec::new();
    collect_kind(&command, "here-doc", &mut heredocs);
    assert_eq!(heredocs.len(), 1);
    assert_eq!(heredocs[0]["content"], "x\n");

    let nodes = parse_json("echo $(( (1) + 2 )) $((cat <<EOF\ny\nEOF\n) | wc)\necho after");
    assert_eq!(nodes.as_array().unwrap().len(), 2);
    let mut heredocs = Vec::new();
    collect_kind(&nodes, "here-doc", &mut heredocs);
    assert_eq!(heredocs.len(), 1);
    assert_eq!(heredocs[0]["content"], "y\n");
    let mut arith = Vec::new();
    collect_kind(&nodes, "arithmetic-expansion", &mut arith);
    assert_eq!(arith.len(), 1);
}
