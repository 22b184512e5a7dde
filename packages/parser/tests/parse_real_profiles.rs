use promodel_parser::{parse, AssignOp, Statement, Test};

#[test]
fn test_application_profile() {
    let source = r#"
# Demo application
TEMPLATE = app
TARGET = demo
DESTDIR = bin

CONFIG += c++17 warn_on

SOURCES += \
    src/main.cpp \
    src/mainwindow.cpp \
    src/document.cpp

HEADERS += \
    src/mainwindow.h \
    src/document.h

FORMS += ui/mainwindow.ui
RESOURCES += res/icons.qrc
OTHER_FILES += README.md

unix {
    LIBS += -lpthread
}

target.path = /usr/local/bin
INSTALLS += target
"#;

    let result = parse(source);
    if let Err(e) = &result {
        eprintln!("Parse error: {:?}", e);
    }
    let pro = result.unwrap();

    let assignments: Vec<&str> = pro
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Assignment(a) => Some(a.name.as_str()),
            _ => None,
        })
        .collect();

    assert!(assignments.contains(&"TEMPLATE"));
    assert!(assignments.contains(&"SOURCES"));
    assert!(assignments.contains(&"target.path"));
    assert!(assignments.contains(&"INSTALLS"));
}

#[test]
fn test_subdirs_profile() {
    let source = r#"
TEMPLATE = subdirs

SUBDIRS = \
    core \
    gui \
    tools

gui.subdir = src/gui
tools.file = tools/tools.pro

OTHER_FILES += docs/notes.txt
"#;

    let pro = parse(source).unwrap();

    let subdirs = pro
        .statements
        .iter()
        .find_map(|s| match s {
            Statement::Assignment(a) if a.name == "SUBDIRS" => Some(a),
            _ => None,
        })
        .expect("SUBDIRS assignment");
    assert_eq!(subdirs.values.len(), 3);
    assert_eq!(subdirs.op, AssignOp::Set);
}

#[test]
fn test_library_profile_with_nested_conditions() {
    let source = r#"
TEMPLATE = lib
TARGET = netcore

include(../defaults.pri)

CONFIG += staticlib

unix {
    debug {
        DEFINES += NET_TRACE
        OBJECTS_DIR = .obj/debug
    } else {
        OBJECTS_DIR = .obj/release
    }
    SOURCES += src/socket_posix.cpp
} else {
    SOURCES += src/socket_generic.cpp
}

contains(CONFIG, staticlib) {
    DEFINES += NET_STATIC
}

isEmpty(PREFIX): PREFIX = /usr/local
"#;

    let pro = parse(source).unwrap();

    let conditions: Vec<&Test> = pro
        .statements
        .iter()
        .filter_map(|s| match s {
            Statement::Condition(c) => Some(&c.test),
            _ => None,
        })
        .collect();
    assert_eq!(conditions.len(), 3);
    assert_eq!(conditions[0], &Test::Feature("unix".into()));

    // the unix block carries an else branch with the generic fallback
    let unix_cond = pro
        .statements
        .iter()
        .find_map(|s| match s {
            Statement::Condition(c) if c.test == Test::Feature("unix".into()) => Some(c),
            _ => None,
        })
        .unwrap();
    assert_eq!(unix_cond.else_branch.len(), 1);
}

#[test]
fn test_wildcards_and_generated_files() {
    let source = r#"
TEMPLATE = app
SOURCES += src/*.cpp
HEADERS += include/*.h
GENERATED_SOURCES += $$OUT_PWD/version.cpp
"#;

    let pro = parse(source).unwrap();
    assert_eq!(pro.statements.len(), 4);
}

#[test]
fn test_profile_without_trailing_newline() {
    let pro = parse("TEMPLATE = app").unwrap();
    assert_eq!(pro.statements.len(), 1);
}

#[test]
fn test_windows_line_endings() {
    let pro = parse("TEMPLATE = app\r\nTARGET = demo\r\n").unwrap();
    assert_eq!(pro.statements.len(), 2);
}
