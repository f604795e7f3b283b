//! Run instrumented classes on a real JVM (skipped when `javac` or `java` is not on `PATH`)

use nullguard::config::Configuration;
use nullguard::instrument::{instrument_batch, Outcome, UnitInput};
use std::fs;
use std::path::Path;
use std::process::Command;
use walkdir::WalkDir;

const ANNOTATION: &str = r#"
package org.jetbrains.annotations;

import java.lang.annotation.*;

@Retention(RetentionPolicy.CLASS)
@Target({ElementType.PARAMETER})
public @interface NotNull {}
"#;

const GREETER: &str = r#"
import org.jetbrains.annotations.NotNull;

public class Greeter {
    private final String greeting;

    public Greeter(@NotNull String greeting) {
        this.greeting = greeting;
    }

    public String greet(@NotNull String name, int times) {
        StringBuilder builder = new StringBuilder();
        for (int i = 0; i < times; i++) {
            try {
                builder.append(greeting).append(' ').append(name.trim());
            } catch (IllegalStateException e) {
                builder.append('?');
            }
        }
        return builder.toString();
    }

    public static String maybe(String value) {
        return value == null ? "none" : value;
    }
}
"#;

const MAIN: &str = r#"
public class Main {
    public static void main(String[] args) {
        System.out.println(new Greeter("hello").greet("world", 2));
        System.out.println(Greeter.maybe(null));
        try {
            new Greeter("hi").greet(null, 1);
            System.out.println("no exception");
        } catch (IllegalArgumentException e) {
            System.out.println(e.getMessage());
        }
        try {
            new Greeter(null);
            System.out.println("no exception");
        } catch (IllegalArgumentException e) {
            System.out.println(e.getMessage());
        }
    }
}
"#;

const NULL_MARKED: &str = r#"
package org.jspecify.annotations;

import java.lang.annotation.*;

@Retention(RetentionPolicy.RUNTIME)
@Target({ElementType.MODULE, ElementType.PACKAGE, ElementType.TYPE, ElementType.METHOD, ElementType.CONSTRUCTOR})
public @interface NullMarked {}
"#;

const NULLABLE: &str = r#"
package org.jspecify.annotations;

import java.lang.annotation.*;

@Retention(RetentionPolicy.RUNTIME)
@Target({ElementType.TYPE_USE})
public @interface Nullable {}
"#;

const SHAPES: &str = r#"
import java.util.function.Supplier;
import org.jspecify.annotations.NullMarked;
import org.jspecify.annotations.Nullable;

@NullMarked
public class Shapes {
    public record Point(String label, int x) {}

    public enum Color {
        RED(null), GREEN("g");

        private final @Nullable String code;

        Color(@Nullable String code) {
            this.code = code;
        }

        public String describe() {
            return name() + ":" + code;
        }
    }

    public class Inner {
        private final String name;

        public Inner(String name) {
            this.name = name;
        }

        public String name() {
            return name;
        }
    }

    public static String local(@Nullable String captured, @Nullable String first, @Nullable String second) {
        class Local {
            final String value;

            Local(String v, @Nullable String w) {
                value = v + w + captured;
            }
        }
        return new Local(first, second).value;
    }

    public String held(@Nullable String captured, @Nullable String value) {
        class Held {
            final String text;

            Held(String v) {
                text = v + captured;
            }
        }
        return new Held(value).text;
    }

    public static String anonymous(@Nullable String captured) {
        Supplier<String> supplier = new Supplier<String>() {
            public String get() {
                return "anon" + captured;
            }
        };
        return supplier.get();
    }

    public static String name(Color color) {
        switch (color) {
            case RED:
                return "red";
            default:
                return "other";
        }
    }
}
"#;

const SHAPES_MAIN: &str = r#"
public class Main {
    static void attempt(String what, Runnable action) {
        try {
            action.run();
            System.out.println(what + " accepted");
        } catch (IllegalArgumentException e) {
            System.out.println(what + " rejected");
        }
    }

    public static void main(String[] args) {
        Shapes.Point point = new Shapes.Point("a", 1);
        System.out.println(point.equals(null));
        System.out.println(point.label() + point.x());
        attempt("record", () -> new Shapes.Point(null, 1));
        System.out.println(Shapes.Color.RED.describe());
        System.out.println(Shapes.Color.values().length);
        Shapes shapes = new Shapes();
        System.out.println(shapes.new Inner("in").name());
        attempt("inner", () -> shapes.new Inner(null));
        System.out.println(Shapes.local(null, "a", null));
        attempt("local", () -> Shapes.local("c", null, "b"));
        System.out.println(shapes.held(null, "h"));
        attempt("held", () -> shapes.held("c", null));
        System.out.println(Shapes.anonymous(null));
        System.out.println(Shapes.name(Shapes.Color.RED));
        attempt("switch", () -> Shapes.name(null));
    }
}
"#;

fn available(tool: &str) -> bool {
    Command::new(tool)
        .arg("-version")
        .output()
        .map_or(false, |output| output.status.success())
}

/// Feature release of `javac` (`javac 17.0.2` is 17, `javac 1.8.0_292` is 8)
fn javac_release() -> Option<u32> {
    let output = Command::new("javac").arg("-version").output().ok()?;
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let version = text.split_whitespace().nth(1)?;
    let mut numbers = version.split(|c: char| !c.is_ascii_digit());
    match numbers.next()?.parse().ok()? {
        1 => numbers.next()?.parse().ok(),
        release => Some(release),
    }
}

/// Write each `(path, source)` under `sources` and compile all of them into `classes`
fn compile(sources: &Path, classes: &Path, files: &[(&str, &str)]) {
    let mut javac = Command::new("javac");
    javac.arg("-g").arg("-d").arg(classes);
    for (path, source) in files {
        let path = sources.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        javac.arg(path);
    }
    assert!(javac.status().unwrap().success());
}

/// Instrument every class file under `classes` in place, returning the number of guards
fn instrument_directory(classes: &Path) -> usize {
    let paths: Vec<_> = WalkDir::new(classes)
        .into_iter()
        .map(|entry| entry.unwrap().into_path())
        .filter(|path| path.extension().map_or(false, |extension| extension == "class"))
        .collect();
    let inputs = paths
        .iter()
        .map(|path| UnitInput {
            identifier: path.display().to_string(),
            payload: fs::read(path).unwrap(),
        })
        .collect();
    let entries = instrument_batch(inputs, &Configuration::default());
    let mut guards = 0;
    for (path, entry) in paths.iter().zip(&entries) {
        assert_ne!(entry.report.outcome, Outcome::Failed, "{:?}", entry.report);
        let output = entry.output.as_ref().unwrap();
        if output.modified {
            fs::write(path, &output.payload).unwrap();
        }
        guards += entry.report.guard_count();
    }
    guards
}

fn run_main(classes: &Path) -> String {
    let output = Command::new("java")
        .arg("-Xverify:all")
        .arg("-cp")
        .arg(classes)
        .arg("Main")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "java failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn guards_throw_on_a_real_jvm() {
    if !available("javac") || !available("java") {
        eprintln!("skipping: javac/java not found");
        return;
    }

    let sources = tempfile::tempdir().unwrap();
    let classes = tempfile::tempdir().unwrap();
    let annotation_dir = sources.path().join("org/jetbrains/annotations");
    fs::create_dir_all(&annotation_dir).unwrap();
    fs::write(annotation_dir.join("NotNull.java"), ANNOTATION).unwrap();
    fs::write(sources.path().join("Greeter.java"), GREETER).unwrap();
    fs::write(sources.path().join("Main.java"), MAIN).unwrap();

    let status = Command::new("javac")
        .arg("-g")
        .arg("-d")
        .arg(classes.path())
        .arg(annotation_dir.join("NotNull.java"))
        .arg(sources.path().join("Greeter.java"))
        .arg(sources.path().join("Main.java"))
        .status()
        .unwrap();
    assert!(status.success());

    let unpatched = run_main(classes.path());
    assert!(unpatched.contains("no exception"));

    let greeter = classes.path().join("Greeter.class");
    let inputs = vec![UnitInput {
        identifier: "Greeter.class".to_owned(),
        payload: fs::read(&greeter).unwrap(),
    }];
    let entries = instrument_batch(inputs, &Configuration::default());
    assert_eq!(entries[0].report.outcome, Outcome::Instrumented);
    assert_eq!(entries[0].report.guard_count(), 2);
    fs::write(&greeter, &entries[0].output.as_ref().unwrap().payload).unwrap();

    let patched = run_main(classes.path());
    assert_eq!(
        patched.lines().collect::<Vec<_>>(),
        vec![
            "hello world hello world",
            "none",
            "parameter 'name' must not be null in Greeter.greet(Ljava/lang/String;I)V",
            "parameter 'greeting' must not be null in Greeter.<init>(Ljava/lang/String;)V",
        ]
    );
}

#[test]
fn compiler_generated_parameters_on_a_real_jvm() {
    match javac_release() {
        Some(release) if release >= 16 && available("java") => (),
        _ => {
            eprintln!("skipping: needs javac/java 16 or later");
            return;
        }
    }

    let sources = tempfile::tempdir().unwrap();
    let classes = tempfile::tempdir().unwrap();
    compile(
        sources.path(),
        classes.path(),
        &[
            ("org/jspecify/annotations/NullMarked.java", NULL_MARKED),
            ("org/jspecify/annotations/Nullable.java", NULLABLE),
            ("Shapes.java", SHAPES),
            ("Main.java", SHAPES_MAIN),
        ],
    );
    assert!(instrument_directory(classes.path()) > 0);

    let patched = run_main(classes.path());
    assert_eq!(
        patched.lines().collect::<Vec<_>>(),
        vec![
            "false",
            "a1",
            "record rejected",
            "RED:null",
            "2",
            "in",
            "inner rejected",
            "anullnull",
            "local rejected",
            "hnull",
            "held rejected",
            "anonnull",
            "red",
            "switch rejected",
        ]
    );
}
