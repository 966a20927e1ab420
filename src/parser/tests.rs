//! Tests for the HTTP parser.

#[cfg(test)]
mod tests {
    use crate::parser::{
        parse_query, parse_request, url_decode, Authorization, BodyEvent, BodyKind, BodyReader,
        DecodeError, Error, HeadParser, HttpVersion, Limits, Method, Methods, Parameter,
        Progress, RequestHead,
    };

    /// Feed `input` in chunks of `size` bytes and return the finished head.
    fn parse_in_chunks(input: &[u8], size: usize) -> RequestHead {
        let mut parser = HeadParser::new(Limits::default());
        for chunk in input.chunks(size) {
            if let Progress::Complete(_) = parser.feed(chunk).unwrap() {
                break;
            }
        }
        assert!(parser.is_complete());
        parser.take_head()
    }

    /// Run a body through a reader in chunks, recording its events.
    fn read_body(kind: BodyKind, body: &[u8], size: usize, limits: Limits) -> Result<Vec<Recorded>, Error> {
        let mut reader = BodyReader::new(&kind, body.len(), &limits)?;
        let mut events = Vec::new();
        for chunk in body.chunks(size.max(1)) {
            reader.feed(chunk, &mut |event| events.push(Recorded::from(event)))?;
        }
        if body.is_empty() {
            reader.feed(&[], &mut |event| events.push(Recorded::from(event)))?;
        }
        Ok(events)
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Recorded {
        Param(Parameter),
        Start(String),
        Data(usize, Vec<u8>),
        End(usize, Vec<u8>),
        Raw(usize, Vec<u8>, usize),
    }

    impl From<BodyEvent<'_>> for Recorded {
        fn from(event: BodyEvent<'_>) -> Self {
            match event {
                BodyEvent::Param(p) => Recorded::Param(p),
                BodyEvent::UploadStart { filename, .. } => Recorded::Start(filename.to_string()),
                BodyEvent::UploadData { index, data, .. } => Recorded::Data(index, data.to_vec()),
                BodyEvent::UploadEnd { index, data, .. } => Recorded::End(index, data.to_vec()),
                BodyEvent::Raw { data, index, total } => Recorded::Raw(index, data.to_vec(), total),
            }
        }
    }

    /// Concatenate the file bytes carried by upload events.
    fn file_bytes(events: &[Recorded]) -> Vec<u8> {
        let mut out = Vec::new();
        for event in events {
            match event {
                Recorded::Data(index, data) | Recorded::End(index, data) => {
                    assert_eq!(*index, out.len());
                    out.extend_from_slice(data);
                }
                _ => {}
            }
        }
        out
    }

    const MULTIPART: &[u8] = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
hello world\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
line one\r\n--XyQnot a boundary\r\n-\r\n--Xy\r\n\
--XyZ--\r\n";

    fn multipart_kind() -> BodyKind {
        BodyKind::Multipart("XyZ".to_string())
    }

    #[test]
    fn test_parse_simple_get_request() {
        let request = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let result = parse_request(request).unwrap();
        assert_eq!(result.method, Method::GET);
        assert_eq!(result.url, "/index.html");
        assert_eq!(result.version, HttpVersion::Http11);
        assert_eq!(result.headers.value("Host"), Some("example.com"));
        assert_eq!(result.host.as_deref(), Some("example.com"));
        assert_eq!(result.body_kind(), BodyKind::Empty);
    }

    #[test]
    fn test_query_parameters_are_split_off() {
        let result = parse_request(b"GET /form?x=1 HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(result.url, "/form");
        assert_eq!(result.params.len(), 1);
        let param = result.params.get("x").unwrap();
        assert_eq!(param.value(), "1");
        assert!(!param.is_from_body());
        assert!(!param.is_file());
        assert_eq!(result.content_length, 0);
    }

    #[test]
    fn test_query_parameters_are_decoded() {
        let result = parse_request(b"GET /s?q=a%20b+c&flag&&e= HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(result.params.value("q"), Some("a b c"));
        assert_eq!(result.params.value("flag"), Some(""));
        assert_eq!(result.params.value("e"), Some(""));
        assert_eq!(result.params.value("missing"), None);
        assert_eq!(result.params.len(), 3);
    }

    #[test]
    fn test_malformed_query_escape_fails() {
        let result = parse_request(b"GET /s?q=%zz HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(Error::UrlDecode(DecodeError::InvalidCharacters))));
    }

    #[test]
    fn test_case_insensitive_headers() {
        let result = parse_request(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        assert!(result.headers.contains("host"));
        assert!(result.headers.contains("HOST"));
        assert!(result.headers.contains("Host"));
    }

    #[test]
    fn test_duplicate_headers_return_first() {
        let result =
            parse_request(b"GET / HTTP/1.1\r\nX-A: one\r\nX-A: two\r\n\r\n").unwrap();
        assert_eq!(result.headers.len(), 2);
        assert_eq!(result.headers.value("x-a"), Some("one"));
        assert_eq!(result.headers.get_index(1).unwrap().value(), "two");
    }

    #[test]
    fn test_unsupported_method() {
        let result = parse_request(b"BREW /pot HTTP/1.1\r\nHost: example.com\r\n\r\n");
        assert!(matches!(result, Err(Error::UnsupportedMethod(ref m)) if m == "BREW"));
    }

    #[test]
    fn test_unsupported_http_version() {
        let result = parse_request(b"GET /index.html HTTP/9.9\r\nHost: example.com\r\n\r\n");
        assert!(matches!(result, Err(Error::UnsupportedVersion(ref v)) if v == "HTTP/9.9"));

        let result = parse_request(b"GET /index.html HTTP/2\r\n\r\n");
        assert!(matches!(result, Err(Error::UnsupportedVersion(_))));
    }

    #[test]
    fn test_malformed_header_line_is_discarded() {
        let result =
            parse_request(b"GET / HTTP/1.1\r\nInvalidHeader\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(result.headers.len(), 1);
        assert_eq!(result.headers.value("Host"), Some("h"));
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(parse_request(b""), Err(Error::EmptyRequest)));
        assert!(matches!(parse_request(b"\r\n"), Err(Error::EmptyRequest)));
    }

    #[test]
    fn test_incomplete_request_line() {
        let result = parse_request(b"GET\r\n");
        assert!(matches!(result, Err(Error::MalformedRequestLine(_))));
    }

    #[test]
    fn test_incomplete_head() {
        let result = parse_request(b"GET / HTTP/1.1\r\nHost: h\r\n");
        assert!(matches!(result, Err(Error::Incomplete)));
    }

    #[test]
    fn test_all_methods() {
        let methods = vec![
            ("GET", Method::GET),
            ("POST", Method::POST),
            ("PUT", Method::PUT),
            ("DELETE", Method::DELETE),
            ("HEAD", Method::HEAD),
            ("OPTIONS", Method::OPTIONS),
            ("PATCH", Method::PATCH),
        ];

        for (name, expected_method) in methods {
            let request = format!("{name} /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n");
            let result = parse_request(request.as_bytes()).unwrap();
            assert_eq!(result.method, expected_method);
            assert_eq!(expected_method.to_string(), name);
        }
    }

    #[test]
    fn test_method_masks() {
        let mask = Methods::GET | Methods::POST;
        assert!(mask.contains(Method::GET));
        assert!(mask.contains(Method::POST));
        assert!(!mask.contains(Method::PUT));
        assert!(Methods::ANY.contains(Method::OPTIONS));
        assert_eq!((Method::GET | Method::HEAD).to_string(), "GET, HEAD");
        assert_eq!(Methods::ANY.to_string(), "ANY");
    }

    #[test]
    fn test_headers_with_multiple_colons() {
        let result = parse_request(
            b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nX-Test: value:with:colons\r\n\r\n",
        )
        .unwrap();
        assert_eq!(result.headers.value("X-Test"), Some("value:with:colons"));
    }

    #[test]
    fn test_http10_without_host() {
        let result = parse_request(b"GET /index.html HTTP/1.0\r\n\r\n").unwrap();
        assert_eq!(result.version, HttpVersion::Http10);
        assert!(result.headers.is_empty());
        assert_eq!(result.host, None);
    }

    #[test]
    fn test_http_version_display() {
        assert_eq!(HttpVersion::Http10.to_string(), "HTTP/1.0");
        assert_eq!(HttpVersion::Http11.to_string(), "HTTP/1.1");
    }

    #[test]
    fn test_special_headers_are_interpreted() {
        let result = parse_request(
            b"POST /up HTTP/1.1\r\n\
Host: device.local\r\n\
Content-Type: multipart/form-data; boundary=\"----abc\"\r\n\
Content-Length: 42\r\n\
Expect: 100-continue\r\n\
Authorization: Basic dXNlcjpwYXNz\r\n\r\n",
        )
        .unwrap();
        assert_eq!(result.content_type.as_deref(), Some("multipart/form-data"));
        assert_eq!(result.boundary.as_deref(), Some("----abc"));
        assert!(result.is_multipart());
        assert_eq!(result.content_length, 42);
        assert!(result.expect_continue);
        assert_eq!(
            result.authorization,
            Some(Authorization::Basic("dXNlcjpwYXNz".to_string()))
        );
        assert_eq!(result.body_kind(), BodyKind::Multipart("----abc".to_string()));
    }

    #[test]
    fn test_body_kind_selection() {
        let form = parse_request(
            b"POST / HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 3\r\n\r\n",
        )
        .unwrap();
        assert_eq!(form.body_kind(), BodyKind::UrlEncoded);

        let json = parse_request(
            b"POST / HTTP/1.1\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n",
        )
        .unwrap();
        assert_eq!(json.body_kind(), BodyKind::Raw);
    }

    #[test]
    fn test_digest_authorization_is_discriminated() {
        let result = parse_request(
            b"GET / HTTP/1.1\r\nAuthorization: Digest username=\"u\", realm=\"r\"\r\n\r\n",
        )
        .unwrap();
        assert!(matches!(result.authorization, Some(Authorization::Digest(_))));
    }

    #[test]
    fn test_expect_continue_requires_http11() {
        let result = parse_request(b"POST / HTTP/1.0\r\nExpect: 100-continue\r\n\r\n").unwrap();
        assert!(!result.expect_continue);
    }

    #[test]
    fn test_multipart_without_boundary() {
        let result = parse_request(b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data\r\n\r\n");
        assert!(matches!(result, Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_invalid_content_length() {
        let result = parse_request(b"POST / HTTP/1.1\r\nContent-Length: -5\r\n\r\n");
        assert!(matches!(result, Err(Error::InvalidContentLength(ref v)) if v == "-5"));
    }

    #[test]
    fn test_line_too_long() {
        let limits = Limits {
            max_line_length: 32,
            ..Limits::default()
        };
        let mut parser = HeadParser::new(limits);
        let long = format!("GET /{} HTTP/1.1", "a".repeat(40));
        // Fails even before the line terminator arrives.
        let result = parser.feed(long.as_bytes());
        assert!(matches!(result, Err(Error::LineTooLong { limit: 32 })));
    }

    #[test]
    fn test_too_many_headers() {
        let limits = Limits {
            max_headers: 2,
            ..Limits::default()
        };
        let mut parser = HeadParser::new(limits);
        let result = parser.feed(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\nC: 3\r\n\r\n");
        assert!(matches!(result, Err(Error::TooManyHeaders(2))));
    }

    #[test]
    fn test_head_parser_version_known_after_request_line() {
        let mut parser = HeadParser::new(Limits::default());
        assert_eq!(parser.feed(b"GET / HT").unwrap(), Progress::Partial);
        assert_eq!(parser.version(), None);
        assert_eq!(parser.feed(b"TP/1.1\r\nX-A: ").unwrap(), Progress::Partial);
        assert_eq!(parser.version(), Some(HttpVersion::Http11));
    }

    #[test]
    fn test_head_parser_reports_body_offset() {
        let mut parser = HeadParser::new(Limits::default());
        let input = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\nbody";
        assert_eq!(parser.feed(input).unwrap(), Progress::Complete(input.len() - 4));
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_the_result() {
        let input: &[u8] = b"POST /api/items?id=7&name=a%20b HTTP/1.1\r\n\
Host: example.com\r\n\
User-Agent: test\r\n\
Content-Type: application/x-www-form-urlencoded\r\n\
Content-Length: 0\r\n\r\n";
        let whole = parse_request(input).unwrap();

        for size in 1..=input.len() {
            let split = parse_in_chunks(input, size);
            assert_eq!(split.method, whole.method, "chunk size {size}");
            assert_eq!(split.url, whole.url, "chunk size {size}");
            assert_eq!(split.version, whole.version, "chunk size {size}");
            assert_eq!(split.headers, whole.headers, "chunk size {size}");
            assert_eq!(split.params, whole.params, "chunk size {size}");
            assert_eq!(split.content_type, whole.content_type, "chunk size {size}");
        }
    }

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a%20b").unwrap(), "a b");
        assert_eq!(url_decode("a+b").unwrap(), "a b");
        assert_eq!(url_decode("%C3%A9t%C3%A9").unwrap(), "été");
        assert_eq!(url_decode("plain").unwrap(), "plain");
        assert_eq!(url_decode("a%2"), Err(DecodeError::NotEnoughDigits));
        assert_eq!(url_decode("a%"), Err(DecodeError::NotEnoughDigits));
        assert_eq!(url_decode("a%zz"), Err(DecodeError::InvalidCharacters));
        assert_eq!(url_decode("a%z"), Err(DecodeError::InvalidCharacters));
        assert_eq!(url_decode("a%2z"), Err(DecodeError::InvalidCharacters));
    }

    #[test]
    fn test_parse_query_marks_origin() {
        let params = parse_query("a=1&b=2", true).unwrap();
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.is_from_body() && !p.is_file()));
        assert_eq!(params[1], Parameter::form("b", "2"));
    }

    #[test]
    fn test_urlencoded_body_yields_form_params() {
        let events = read_body(BodyKind::UrlEncoded, b"user=jo%20e&pin=12", 5, Limits::default()).unwrap();
        assert_eq!(
            events,
            vec![
                Recorded::Param(Parameter::form("user", "jo e")),
                Recorded::Param(Parameter::form("pin", "12")),
            ]
        );
    }

    #[test]
    fn test_urlencoded_body_over_limit() {
        let limits = Limits {
            max_form_size: 4,
            ..Limits::default()
        };
        let result = BodyReader::new(&BodyKind::UrlEncoded, 10, &limits);
        assert!(matches!(result, Err(Error::BodyTooLarge { size: 10, limit: 4 })));
    }

    #[test]
    fn test_body_longer_than_declared() {
        let mut reader = BodyReader::new(&BodyKind::Raw, 3, &Limits::default()).unwrap();
        let result = reader.feed(b"abcd", &mut |_| {});
        assert!(matches!(
            result,
            Err(Error::BodyLengthMismatch { expected: 3, received: 4 })
        ));
    }

    #[test]
    fn test_raw_body_is_streamed() {
        let events = read_body(BodyKind::Raw, b"{\"on\":true}", 4, Limits::default()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Recorded::Raw(0, b"{\"on".to_vec(), 11));
        assert_eq!(events[2], Recorded::Raw(8, b"ue}".to_vec(), 11));
    }

    #[test]
    fn test_multipart_field_and_file() {
        let events = read_body(multipart_kind(), MULTIPART, MULTIPART.len(), Limits::default()).unwrap();

        assert_eq!(events[0], Recorded::Param(Parameter::form("title", "hello world")));
        assert_eq!(events[1], Recorded::Start("a.txt".to_string()));
        let content = b"line one\r\n--XyQnot a boundary\r\n-\r\n--Xy".to_vec();
        assert_eq!(file_bytes(&events), content);
        assert_eq!(
            events.last().unwrap(),
            &Recorded::Param(Parameter::file("doc", "a.txt", content.len()))
        );
    }

    #[test]
    fn test_multipart_split_at_every_point() {
        let expected = read_body(multipart_kind(), MULTIPART, MULTIPART.len(), Limits::default()).unwrap();
        let expected_file = file_bytes(&expected);

        for split in 1..MULTIPART.len() {
            let mut reader =
                BodyReader::new(&multipart_kind(), MULTIPART.len(), &Limits::default()).unwrap();
            let mut events = Vec::new();
            let (head, tail) = MULTIPART.split_at(split);
            reader.feed(head, &mut |e| events.push(Recorded::from(e))).unwrap();
            let progress = reader.feed(tail, &mut |e| events.push(Recorded::from(e))).unwrap();

            assert_eq!(progress, Progress::Complete(tail.len()), "split at {split}");
            assert_eq!(file_bytes(&events), expected_file, "split at {split}");
            let params: Vec<_> = events.iter().filter(|e| matches!(e, Recorded::Param(_))).collect();
            assert_eq!(params.len(), 2, "split at {split}");
            let starts = events.iter().filter(|e| matches!(e, Recorded::Start(_))).count();
            let ends = events.iter().filter(|e| matches!(e, Recorded::End(..))).count();
            assert_eq!((starts, ends), (1, 1), "split at {split}");
        }
    }

    #[test]
    fn test_multipart_byte_by_byte_with_small_upload_buffer() {
        let limits = Limits {
            upload_buffer_size: 4,
            ..Limits::default()
        };
        let events = read_body(multipart_kind(), MULTIPART, 1, limits).unwrap();
        let data_events = events.iter().filter(|e| matches!(e, Recorded::Data(..))).count();
        assert!(data_events >= 9);
        assert!(events
            .iter()
            .all(|e| !matches!(e, Recorded::Data(_, d) if d.len() > 4)));
        assert_eq!(
            file_bytes(&events),
            b"line one\r\n--XyQnot a boundary\r\n-\r\n--Xy".to_vec()
        );
    }

    #[test]
    fn test_multipart_zero_length_file() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"empty.bin\"\r\n\r\n\r\n--b--\r\n";
        let events = read_body(BodyKind::Multipart("b".into()), body, body.len(), Limits::default()).unwrap();
        assert_eq!(
            events,
            vec![
                Recorded::Start("empty.bin".to_string()),
                Recorded::End(0, Vec::new()),
                Recorded::Param(Parameter::file("f", "empty.bin", 0)),
            ]
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, Recorded::Param(p) if p.is_file() && p.size() > 0)));
    }

    #[test]
    fn test_multipart_unterminated() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nvalue";
        let result = read_body(BodyKind::Multipart("b".into()), body, body.len(), Limits::default());
        assert!(matches!(result, Err(Error::UnterminatedMultipart)));
    }

    #[test]
    fn test_multipart_field_count_over_limit() {
        let limits = Limits {
            max_params: 3,
            ..Limits::default()
        };
        let fields = |count: usize| {
            let mut body = Vec::new();
            for i in 0..count {
                let part = format!("--b\r\nContent-Disposition: form-data; name=\"f{i}\"\r\n\r\nx\r\n");
                body.extend_from_slice(part.as_bytes());
            }
            body.extend_from_slice(b"--b--");
            body
        };

        let events = read_body(BodyKind::Multipart("b".into()), &fields(3), 16, limits).unwrap();
        assert_eq!(events.len(), 3);

        let result = read_body(BodyKind::Multipart("b".into()), &fields(4), 16, limits);
        assert!(matches!(result, Err(Error::TooManyParams(3))));
    }

    #[test]
    fn test_urlencoded_field_count_over_limit() {
        let limits = Limits {
            max_params: 2,
            ..Limits::default()
        };
        let result = read_body(BodyKind::UrlEncoded, b"a=1&b=2&c=3", 4, limits);
        assert!(matches!(result, Err(Error::TooManyParams(2))));
        assert_eq!(read_body(BodyKind::UrlEncoded, b"a=1&b=2", 4, limits).unwrap().len(), 2);
    }

    #[test]
    fn test_multipart_field_over_limit() {
        let limits = Limits {
            max_form_size: 3,
            ..Limits::default()
        };
        let body = b"--b\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\ntoolong\r\n--b--";
        let result = read_body(BodyKind::Multipart("b".into()), body, body.len(), limits);
        assert!(matches!(result, Err(Error::BodyTooLarge { limit: 3, .. })));
    }
}
