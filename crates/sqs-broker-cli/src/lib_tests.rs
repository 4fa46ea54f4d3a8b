//! Tests for the sqs-broker-cli library module.

use super::*;
use sqs_broker::ReceiptHandle;
use std::io::Write as _;

fn queue_url() -> String {
    "https://sqs.eu-west-1.amazonaws.com/123456789012/orders".to_string()
}

fn write_config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

// ============================================================================
// Argument Parsing
// ============================================================================

mod parsing_tests {
    use super::*;

    /// Verify consume arguments map onto their fields
    #[test]
    fn test_consume_arguments() {
        let cli = Cli::try_parse_from([
            "sqs-broker",
            "consume",
            "--queue-url",
            "https://example.com/q",
            "--max-messages",
            "5",
            "--wait-time",
            "3",
            "--attribute-name",
            "All",
            "--message-attribute-name",
            "trace.*",
            "--message-attribute-name",
            "tenant",
            "--limit",
            "2",
            "--format",
            "json",
        ])
        .expect("Failed to parse");

        match cli.command {
            Commands::Consume(args) => {
                assert_eq!(args.queue_url.as_deref(), Some("https://example.com/q"));
                assert_eq!(args.max_messages, Some(5));
                assert_eq!(args.wait_time, Some(3));
                assert_eq!(args.attribute_names, vec!["All"]);
                assert_eq!(args.message_attribute_names, vec!["trace.*", "tenant"]);
                assert_eq!(args.limit, Some(2));
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("Expected Consume command"),
        }
    }

    /// Verify send takes positional bodies and defaults to text output
    #[test]
    fn test_send_arguments() {
        let cli = Cli::try_parse_from([
            "sqs-broker",
            "--json-logs",
            "send",
            "-b",
            "3",
            "--generate-ids",
            "first",
            "second",
        ])
        .expect("Failed to parse");

        assert!(cli.json_logs);
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.batch_size, Some(3));
                assert!(args.generate_ids);
                assert_eq!(args.bodies, vec!["first", "second"]);
                assert_eq!(args.format, OutputFormat::Text);
                assert!(args.queue_url.is_none());
            }
            _ => panic!("Expected Send command"),
        }
    }

    /// Verify config command flags
    #[test]
    fn test_config_arguments() {
        let cli = Cli::try_parse_from(["sqs-broker", "config", "--show", "--format", "toml"])
            .expect("Failed to parse");

        match cli.command {
            Commands::Config { show, format } => {
                assert!(show);
                assert_eq!(format, ConfigFormat::Toml);
            }
            _ => panic!("Expected Config command"),
        }
    }

    /// Verify a subcommand is required and formats are checked
    #[test]
    fn test_invalid_arguments_rejected() {
        assert!(Cli::try_parse_from(["sqs-broker"]).is_err());
        assert!(Cli::try_parse_from(["sqs-broker", "consume", "--format", "xml"]).is_err());
        assert!(Cli::try_parse_from(["sqs-broker", "consume", "--max-messages", "many"]).is_err());
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration_tests {
    use super::*;

    /// Verify configuration defaults
    #[test]
    fn test_config_defaults() {
        let config = CliConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.gateway.request_timeout_seconds, 30);
        assert_eq!(config.consumer.wait_time_seconds, 20);
        assert_eq!(config.producer.batch_size, 10);
        assert!(config.validate().is_ok());
    }

    /// Verify arguments override configured consumer settings
    #[test]
    fn test_consumer_config_overrides() {
        let mut config = CliConfig::default();
        config.gateway.region = "us-east-2".to_string();
        config.consumer.queue_url = queue_url();
        config.consumer.max_number_of_messages = 4;
        config.consumer.start_running = true;

        let args = ConsumeArgs {
            wait_time: Some(1),
            polling_delay_ms: Some(250),
            message_attribute_names: vec!["All".to_string()],
            ..ConsumeArgs::default()
        };
        let resolved = consumer_config(&args, &config);

        assert_eq!(resolved.queue_url, queue_url());
        assert_eq!(resolved.region, "us-east-2");
        assert_eq!(resolved.max_number_of_messages, 4);
        assert_eq!(resolved.wait_time_seconds, 1);
        assert_eq!(resolved.polling_wait_time_ms, 250);
        assert_eq!(resolved.message_attribute_names, vec!["All"]);
        assert!(resolved.attribute_names.is_empty());
        assert!(!resolved.start_running);
    }

    /// Verify arguments override configured producer settings
    #[test]
    fn test_producer_config_overrides() {
        let mut config = CliConfig::default();
        config.producer.queue_url = queue_url();
        config.producer.batch_size = 5;

        let args = SendArgs {
            queue_url: Some("https://example.com/other".to_string()),
            ..SendArgs::default()
        };
        let resolved = producer_config(&args, &config);

        assert_eq!(resolved.queue_url, "https://example.com/other");
        assert_eq!(resolved.batch_size, 5);
    }

    /// Verify only sections with a queue URL are validated
    #[test]
    fn test_validate_sections_with_queue_url() {
        let mut config = CliConfig::default();
        config.consumer.max_number_of_messages = 11;
        assert!(config.validate().is_ok());

        config.consumer.queue_url = queue_url();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(ConfigurationError::Invalid { .. }))
        ));
    }

    /// Verify the HTTP timeout must outlast the long-polling wait
    #[test]
    fn test_validate_timeout_exceeds_wait_time() {
        let mut config = CliConfig::default();
        config.gateway.request_timeout_seconds = 20;

        let err = config.validate().expect_err("Expected invalid configuration");
        assert!(err.to_string().contains("request_timeout_seconds"));
    }

    /// Verify secrets are masked but identifiers kept
    #[test]
    fn test_redacted_masks_secrets() {
        let mut config = CliConfig::default();
        config.gateway.access_key_id = Some("AKIDEXAMPLE".to_string());
        config.gateway.secret_access_key = Some("wJalrXUtnFEMI".to_string());

        let redacted = config.redacted();

        assert_eq!(redacted.gateway.access_key_id.as_deref(), Some("AKIDEXAMPLE"));
        assert_eq!(
            redacted.gateway.secret_access_key.as_deref(),
            Some("<redacted>")
        );
        assert!(redacted.gateway.session_token.is_none());
    }

    /// Verify every output format renders and parses back
    #[test]
    fn test_render_config_formats() {
        let mut config = CliConfig::default();
        config.consumer.queue_url = queue_url();

        let yaml = render_config(&config, ConfigFormat::Yaml).expect("Failed to render YAML");
        let from_yaml: CliConfig = serde_yaml::from_str(&yaml).expect("Failed to parse YAML");
        assert_eq!(from_yaml.consumer, config.consumer);

        let json = render_config(&config, ConfigFormat::Json).expect("Failed to render JSON");
        let from_json: CliConfig = serde_json::from_str(&json).expect("Failed to parse JSON");
        assert_eq!(from_json.producer, config.producer);

        let toml_text = render_config(&config, ConfigFormat::Toml).expect("Failed to render TOML");
        assert!(toml_text.contains("[consumer]"));
        assert!(toml_text.contains(&queue_url()));
    }

    /// Verify settings are read from the given file
    #[test]
    fn test_load_configuration_from_file() {
        let file = write_config_file(
            r#"
gateway:
  region: ap-southeast-2
  endpoint: http://localhost:4566
consumer:
  queue_url: https://example.com/orders
  max_number_of_messages: 10
  polling_wait_time_ms: 500
producer:
  batch_size: 4
logging:
  level: debug
  format: json
"#,
        );

        let config = load_configuration(Some(file.path())).expect("Failed to load");

        assert_eq!(config.gateway.region, "ap-southeast-2");
        assert_eq!(
            config.gateway.endpoint.as_deref(),
            Some("http://localhost:4566")
        );
        assert_eq!(config.consumer.queue_url, "https://example.com/orders");
        assert_eq!(config.consumer.max_number_of_messages, 10);
        assert_eq!(config.consumer.polling_wait_time_ms, 500);
        assert_eq!(config.consumer.wait_time_seconds, 20);
        assert_eq!(config.producer.batch_size, 4);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    /// Verify a missing file is reported as such
    #[test]
    fn test_load_configuration_missing_file() {
        let result = load_configuration(Some(Path::new("/nonexistent/sqs-broker.yaml")));

        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    /// Verify file values are validated after loading
    #[test]
    fn test_load_configuration_rejects_invalid_values() {
        let file = write_config_file(
            r#"
consumer:
  queue_url: https://example.com/orders
  wait_time_seconds: 25
"#,
        );

        let result = load_configuration(Some(file.path()));

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}

// ============================================================================
// Command Helpers
// ============================================================================

mod command_tests {
    use super::*;

    fn received(body: &str) -> ReceivedMessage {
        let receipt = ReceiptHandle::new("receipt-1".to_string()).expect("Valid receipt");
        ReceivedMessage::new(receipt, body)
    }

    /// Verify bodies come from arguments first, then non-empty file lines
    #[test]
    fn test_collect_bodies_from_args_and_file() {
        let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        writeln!(file, "from-file-1\n\n   \nfrom-file-2").expect("Failed to write");

        let args = SendArgs {
            file: Some(file.path().to_path_buf()),
            bodies: vec!["from-args".to_string()],
            ..SendArgs::default()
        };

        let bodies = collect_bodies(&args).expect("Failed to collect");
        assert_eq!(bodies, vec!["from-args", "from-file-1", "from-file-2"]);
    }

    /// Verify sending nothing is an argument error
    #[test]
    fn test_collect_bodies_requires_input() {
        let err = collect_bodies(&SendArgs::default()).expect_err("Expected error");

        assert!(matches!(err, CliError::InvalidArgument { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    /// Verify text output uses a placeholder for a missing message id
    #[test]
    fn test_format_message_text() {
        let mut message = received("hello");
        assert_eq!(
            format_message(&message, OutputFormat::Text).expect("Failed to format"),
            "-\thello"
        );

        message.message_id = Some("m-1".to_string());
        assert_eq!(
            format_message(&message, OutputFormat::Text).expect("Failed to format"),
            "m-1\thello"
        );
    }

    /// Verify JSON output carries the body
    #[test]
    fn test_format_message_json() {
        let line = format_message(&received("{\"a\":1}"), OutputFormat::Json)
            .expect("Failed to format");

        let value: serde_json::Value = serde_json::from_str(&line).expect("Invalid JSON");
        assert_eq!(value["body"], "{\"a\":1}");
        assert!(!line.contains('\n'));
    }

    /// Verify send results print the entry id and service message id
    #[test]
    fn test_format_send_result_text() {
        let entry = SendBatchResultEntry {
            id: "a".to_string(),
            message_id: "msg-a".to_string(),
            md5_of_message_body: None,
            md5_of_message_attributes: None,
            md5_of_message_system_attributes: None,
            sequence_number: None,
        };

        assert_eq!(
            format_send_result(&entry, OutputFormat::Text).expect("Failed to format"),
            "a\tmsg-a"
        );
    }

    /// Verify the stop grace covers the long-poll wait and the inter-poll delay
    #[test]
    fn test_shutdown_grace_includes_polling_delay() {
        let mut config = CliConfig::default().consumer;
        config.wait_time_seconds = 2;
        config.polling_wait_time_ms = 0;
        assert_eq!(shutdown_grace(&config), Duration::from_secs(3));

        config.polling_wait_time_ms = 5_000;
        assert_eq!(shutdown_grace(&config), Duration::from_millis(8_000));
    }

    /// Verify each error kind has its own exit code
    #[test]
    fn test_exit_codes() {
        let configuration = CliError::Configuration(ConfigError::FileNotFound {
            path: PathBuf::from("x.yaml"),
        });
        let queue = CliError::Queue(QueueError::QueueNotFound {
            queue_url: queue_url(),
        });
        let send = CliError::Send(ProducerError::PartialFailure {
            failed: Vec::new(),
            successful: Vec::new(),
        });

        assert_eq!(configuration.exit_code(), 1);
        assert_eq!(queue.exit_code(), 2);
        assert_eq!(send.exit_code(), 3);
        assert_eq!(
            CliError::Output {
                message: "bad".to_string()
            }
            .exit_code(),
            6
        );
    }
}
